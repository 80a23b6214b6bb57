//! Reassembler (§4.5): runs a job-oriented state machine per
//! `ReassembleFile` request — bounded parallel chunk fetchers, ordered
//! assembly, a final whole-file hash check, progress via a `watch`
//! channel, and cooperative cancellation.

mod corruption;
mod error;
mod job;
mod progress;

pub use corruption::{CorruptionReporter, NoopCorruptionReporter};
pub use error::{ReassemblyError, Result};
pub use job::{JobHandle, JobSummary, Reassembler, DEFAULT_HISTORY_CAP, DEFAULT_MAX_FETCHERS};
pub use progress::{JobPhase, ReassemblyProgress};
