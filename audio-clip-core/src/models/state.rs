use super::error::ClipError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → capturing ⇄ restarting
///          ↓    ↑        ↓
///        failed ─┘    disposed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Capturing,
    Restarting,
    Failed(ClipError),
    Disposed,
}

impl SessionState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Restarting => "restarting",
            Self::Failed(_) => "failed",
            Self::Disposed => "disposed",
        }
    }
}
