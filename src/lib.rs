//! A/B testing core for the marketing site: a registry of test definitions,
//! date/status/page eligibility, session-sticky weighted variant assignment
//! and an append-only result log.
//!
//! Everything that touches the outside world goes through a small port:
//! [`SessionStorage`] for persistence, [`AnalyticsSink`] for fire-and-forget
//! tracking, [`Clock`] for dates and [`RandomSource`] for draws. The
//! [`AbTesting`] service wires them together.

pub mod error;
pub mod experiments;

pub use error::{AbTestError, StorageError};
pub use experiments::analytics::{AnalyticsSink, NoopSink, RecordingSink, TracingSink};
pub use experiments::assignment::{FixedDraw, RandomSource, ThreadRandom};
pub use experiments::config::{TestDefinition, TestStatus, Variant};
pub use experiments::eligibility::{Clock, FixedClock, SystemClock};
pub use experiments::registry::{RegistryPatch, TestRegistry};
pub use experiments::results::{ResultEvent, TestSummary, VariantSummary};
pub use experiments::service::AbTesting;
pub use experiments::storage::{FileStorage, MemoryStorage, SessionStorage, UnavailableStorage};
pub use experiments::targeting::PagePattern;
