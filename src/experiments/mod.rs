pub mod analytics;
pub mod assignment;
pub mod config;
pub mod eligibility;
pub mod registry;
pub mod results;
pub mod service;
pub mod storage;
pub mod targeting;
