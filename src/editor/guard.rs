use async_trait::async_trait;
use tracing::debug;

use crate::docs::ChangeType;
use crate::error::EditorError;

use super::controller::EditorSession;

/// Navigation-guard state, derived from the draft's dirtiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Clean,
    Guarded,
}

/// The three resolutions a user can pick when leaving with unsaved edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveResolution {
    /// Proceed with the navigation; the draft is abandoned unsaved.
    Discard,
    /// Save first, then proceed only if the save succeeds.
    SaveAndLeave,
    /// Stay in the editor; nothing changes.
    Cancel,
}

/// Whether the pending navigation may take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Proceed,
    Stay,
}

/// The host environment's three-way prompt, asked whenever an exit attempt
/// hits a guarded session.
#[async_trait]
pub trait LeavePrompt: Send + Sync {
    async fn resolve_leave(&self) -> LeaveResolution;
}

impl EditorSession {
    /// `Guarded` whenever the draft is dirty, `Clean` otherwise.
    pub fn guard_state(&self) -> GuardState {
        if !self.is_closed() && self.is_dirty() {
            GuardState::Guarded
        } else {
            GuardState::Clean
        }
    }

    /// The host must call this before any navigation away from the editor
    /// (closing the view, an in-app back action, an unload signal) and only
    /// navigate on `Proceed`.
    ///
    /// The guard keeps no bypass state: every attempt re-evaluates the dirty
    /// predicate, so repeating the navigation gesture prompts again. A failed
    /// save-and-leave returns the error and the session stays open and dirty.
    pub async fn try_leave(&self, prompt: &dyn LeavePrompt) -> Result<LeaveOutcome, EditorError> {
        if self.guard_state() == GuardState::Clean {
            self.close();
            return Ok(LeaveOutcome::Proceed);
        }

        match prompt.resolve_leave().await {
            LeaveResolution::Cancel => {
                debug!(document_id = %self.document_id(), "leave cancelled");
                Ok(LeaveOutcome::Stay)
            }
            LeaveResolution::Discard => {
                debug!(document_id = %self.document_id(), "unsaved draft discarded on leave");
                self.close();
                Ok(LeaveOutcome::Proceed)
            }
            LeaveResolution::SaveAndLeave => {
                self.save(ChangeType::Manual, None).await?;
                self.close();
                Ok(LeaveOutcome::Proceed)
            }
        }
    }
}
