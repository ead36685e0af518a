pub mod audit;
pub mod concurrency;
pub mod config;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod probe;
pub mod query;
pub mod record;
pub mod scheduler;
pub mod scoring;
pub mod sink;
pub mod spend;
pub mod strategy;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod ingest_tests;

pub use audit::{AuditVerdict, Auditor};
pub use concurrency::{ConcurrencyController, RoundOutcome};
pub use config::{DiscoveryConfig, ServiceConfig};
pub use controller::{DiscoveryRun, NoProgress, RunOutcome, RunPhase, RunReport};
pub use error::DiscoveryError;
pub use ingest::{Candidate, IngestionEngine, RunState, SuppressionCounts};
pub use probe::{ApifyProbe, ProbeExecutor};
pub use query::{Dimension, QueryTask, SearchMode};
pub use scheduler::{QueryPools, QueryScheduler};
pub use scoring::{MatchSignal, ScoringPolicy, SuppressionReason};
pub use sink::{CandidateSink, WatchSink};
pub use spend::{SpendSummary, SpendTracker};
pub use strategy::{generate_strategy, StrategyMatrix};
