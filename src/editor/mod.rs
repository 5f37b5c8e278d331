mod autosave;
mod controller;
mod guard;
mod primary;
mod session;
mod suggestion;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{EditorSession, SaveAttempt};
pub use guard::{GuardState, LeaveOutcome, LeavePrompt, LeaveResolution};
pub use primary::{DocumentOpening, PrimarySelection};
pub use session::{DraftSession, Field, SessionOptions};
pub use suggestion::{AcceptMode, PendingSuggestion, SourceSpan, SuggestionState};
