use serde::{Deserialize, Serialize};

/// Lifecycle of a capture job.
///
/// `Scheduled → Capturing → Finalizing → Delivering → {Completed | Cancelled | Failed}`.
/// `Scheduled` is skipped for immediate starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Scheduled,
    Capturing,
    Finalizing,
    Delivering,
    Completed,
    Cancelled,
    Failed,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Scheduled => "scheduled",
            JobPhase::Capturing => "capturing",
            JobPhase::Finalizing => "finalizing",
            JobPhase::Delivering => "delivering",
            JobPhase::Completed => "completed",
            JobPhase::Cancelled => "cancelled",
            JobPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Cancelled | JobPhase::Failed
        )
    }

    pub fn can_transition_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Cancelled => true,
            Capturing => self == Scheduled,
            Finalizing => self == Capturing,
            Delivering => self == Finalizing,
            Completed => self == Delivering,
            Failed => matches!(self, Capturing | Finalizing | Delivering),
            Scheduled => false,
        }
    }
}
