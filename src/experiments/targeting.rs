//! Target-page patterns.
//!
//! A pattern is one of:
//! - an exact path (`/quote`),
//! - a path with a single bracketed dynamic segment (`/industries/[industry]`),
//! - the universal wildcard (`/*` or `*`).
//!
//! Patterns are compiled into segments once and compared segment by segment
//! against the `/`-split path.

use crate::error::AbTestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePattern {
    Exact(String),
    Dynamic(Vec<Segment>),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `[name]`: matches any non-empty segment.
    Param(String),
}

fn invalid(pattern: &str, reason: &str) -> AbTestError {
    AbTestError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

impl PagePattern {
    pub fn parse(raw: &str) -> Result<Self, AbTestError> {
        if raw == "*" || raw == "/*" {
            return Ok(PagePattern::Any);
        }
        if !raw.starts_with('/') {
            return Err(invalid(raw, "must start with '/' or be the '*' wildcard"));
        }
        if !raw.contains('[') && !raw.contains(']') {
            return Ok(PagePattern::Exact(raw.to_string()));
        }

        let mut segments = Vec::new();
        let mut params = 0;
        for part in raw.split('/') {
            if let Some(inner) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                if inner.is_empty() || inner.contains('[') || inner.contains(']') {
                    return Err(invalid(raw, "bracketed segment must name a parameter"));
                }
                params += 1;
                segments.push(Segment::Param(inner.to_string()));
            } else if part.contains('[') || part.contains(']') {
                return Err(invalid(raw, "brackets must wrap a whole segment"));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        if params > 1 {
            return Err(invalid(raw, "only one dynamic segment is supported"));
        }
        Ok(PagePattern::Dynamic(segments))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PagePattern::Any => true,
            PagePattern::Exact(exact) => exact == path,
            PagePattern::Dynamic(segments) => {
                let parts: Vec<&str> = path.split('/').collect();
                if parts.len() != segments.len() {
                    return false;
                }
                segments.iter().zip(parts).all(|(segment, part)| match segment {
                    Segment::Literal(lit) => lit == part,
                    Segment::Param(_) => !part.is_empty(),
                })
            }
        }
    }
}
