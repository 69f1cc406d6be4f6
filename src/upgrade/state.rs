use crate::error::UpdateError;

/// Where an [`UpdatePipeline`](super::UpdatePipeline) is in its run.
///
/// ```text
/// Idle -> Checking -> UpToDate | AwaitingConfirmation | Failed
/// AwaitingConfirmation -> Updating | Idle
/// Updating -> Succeeded | Failed
/// UpToDate | Succeeded | Failed -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Checking,
    UpToDate,
    AwaitingConfirmation,
    Updating,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn can_advance(self, to: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, to),
            (Idle, Checking)
                | (Checking, UpToDate | AwaitingConfirmation | Failed)
                | (AwaitingConfirmation, Updating | Idle)
                | (Updating, Succeeded | Failed)
                | (UpToDate | Succeeded | Failed, Idle)
        )
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<(), UpdateError> {
        if *self == PipelineState::Updating
            && !matches!(to, PipelineState::Succeeded | PipelineState::Failed)
        {
            return Err(UpdateError::Busy);
        }
        if !self.can_advance(to) {
            return Err(UpdateError::InvalidTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }

    /// A run is finished and a new one may start from `Idle`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::UpToDate | PipelineState::Succeeded | PipelineState::Failed
        )
    }
}
