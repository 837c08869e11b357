//! Deduplicated, cached, retried execution of validated queries.

mod cancel;
mod error;
mod key;
mod orchestrator;

pub use cancel::CancellationToken;
pub use error::QueryError;
pub use key::QueryKey;
pub use orchestrator::{mutate, QueryOptions, QueryOrchestrator, DEFAULT_STALE_TIME};
