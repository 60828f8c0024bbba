//! The aggregation pipeline: sources, orchestration, matching, persistence
//! and tracking.
//!
//! A search flows `Orchestrator` → `Matcher` → `persist`, wrapped up by the
//! [`Aggregator`] entry point. [`TrackingService`] serves the per-user side.

pub mod aggregate;
pub mod error;
pub mod matcher;
pub mod orchestrator;
pub mod persist;
pub mod sources;
pub mod tracking;

pub use aggregate::{Aggregator, SearchFilters, SearchOutcome, SearchRequest, SortKey};
pub use error::{Error, Result, SourceError};
pub use matcher::{MatcherBackend, ProcessMatcher};
pub use orchestrator::{Aggregation, Orchestrator};
pub use persist::{PersistFailure, PersistReport, persist};
pub use sources::{SourceAdapter, SourceRegistry};
pub use tracking::TrackingService;
