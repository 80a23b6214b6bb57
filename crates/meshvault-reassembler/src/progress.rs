//! Progress reporting (§4.5, §6): a cheap non-blocking read for callers
//! that poll a running job rather than awaiting its completion.

/// One of the three phases a running job passes through on its way to a
/// terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Downloading,
    Assembling,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed | JobPhase::Cancelled)
    }
}

/// Snapshot published through a `watch` channel on every chunk boundary
/// (§4.5: "downloading 0-50, assembling 50-85, verifying 85-100").
#[derive(Clone, Debug)]
pub struct ReassemblyProgress {
    pub phase: JobPhase,
    pub percent: u8,
    pub error: Option<String>,
}

impl ReassemblyProgress {
    pub fn pending() -> Self {
        Self {
            phase: JobPhase::Pending,
            percent: 0,
            error: None,
        }
    }

    pub(crate) fn downloading(fraction_done: f64) -> Self {
        Self {
            phase: JobPhase::Downloading,
            percent: (fraction_done.clamp(0.0, 1.0) * 50.0) as u8,
            error: None,
        }
    }

    pub(crate) fn assembling(fraction_done: f64) -> Self {
        Self {
            phase: JobPhase::Assembling,
            percent: 50 + (fraction_done.clamp(0.0, 1.0) * 35.0) as u8,
            error: None,
        }
    }

    pub(crate) fn verifying() -> Self {
        Self {
            phase: JobPhase::Verifying,
            percent: 85,
            error: None,
        }
    }

    pub(crate) fn completed() -> Self {
        Self {
            phase: JobPhase::Completed,
            percent: 100,
            error: None,
        }
    }

    pub(crate) fn failed(error: String) -> Self {
        Self {
            phase: JobPhase::Failed,
            percent: 0,
            error: Some(error),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            phase: JobPhase::Cancelled,
            percent: 0,
            error: None,
        }
    }
}
