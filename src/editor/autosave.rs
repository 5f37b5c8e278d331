use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::docs::{ChangeType, UpdateDocumentInput};

use super::controller::{EditorSession, SaveAttempt, SessionInner};
use super::session::Field;

/// The two autosave timers owned by one session. Aborted on close so nothing
/// fires against a destroyed session.
pub(crate) struct TimerHandles {
    periodic: JoinHandle<()>,
    debounce: JoinHandle<()>,
}

impl TimerHandles {
    pub(crate) fn abort(&self) {
        self.periodic.abort();
        self.debounce.abort();
    }
}

pub(crate) fn start(
    inner: Arc<SessionInner>,
    edits_rx: mpsc::UnboundedReceiver<Field>,
) -> TimerHandles {
    let periodic = tokio::spawn(periodic_full_autosave(inner.clone()));
    let debounce = tokio::spawn(debounced_field_autosave(inner, edits_rx));
    TimerHandles { periodic, debounce }
}

/// Every interval tick: if the draft is dirty and no save is in flight, run
/// a full save with `ChangeType::Auto`. A tick that finds a save running is
/// a no-op, not a queued retry; failures are retried on the next tick and
/// never interrupt the user.
async fn periodic_full_autosave(inner: Arc<SessionInner>) {
    let session = EditorSession { inner };
    let period = session.inner.config.autosave_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if session.inner.closed.load(Ordering::SeqCst) {
            break;
        }
        if !session.inner.draft.lock().unwrap().is_dirty() {
            continue;
        }

        match session.try_save(ChangeType::Auto).await {
            SaveAttempt::Completed(Ok(snapshot)) => debug!(
                document_id = %session.inner.document_id,
                sequence = snapshot.sequence,
                "periodic autosave"
            ),
            SaveAttempt::Completed(Err(e)) => warn!(
                document_id = %session.inner.document_id,
                error = %e,
                "periodic autosave failed; retrying next tick"
            ),
            SaveAttempt::Suppressed => debug!(
                document_id = %session.inner.document_id,
                "autosave tick skipped; save already in flight"
            ),
        }
    }
}

/// Collect edits to debounce-registered fields and, once they settle for the
/// configured delay, persist just those fields. No snapshot is written on
/// this path: it is a lossy best-effort save, not a version.
async fn debounced_field_autosave(
    inner: Arc<SessionInner>,
    mut edits_rx: mpsc::UnboundedReceiver<Field>,
) {
    let debounce = inner.config.field_debounce();
    let mut pending: BTreeSet<Field> = BTreeSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            edit = edits_rx.recv() => match edit {
                Some(field) => {
                    // Every edit restarts the settle timer.
                    pending.insert(field);
                    deadline = Some(Instant::now() + debounce);
                }
                None => break,
            },
            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                flush_fields(&inner, &mut pending).await;
            }
        }
    }
}

async fn flush_fields(inner: &Arc<SessionInner>, pending: &mut BTreeSet<Field>) {
    let update = {
        let draft = inner.draft.lock().unwrap();
        let mut update = UpdateDocumentInput::default();
        for field in pending.iter() {
            match field {
                Field::Title => update.title = Some(draft.live().title.clone()),
                Field::Content => update.content = Some(draft.live().content.clone()),
                Field::Meta(key) => {
                    if let Some(value) = draft.live().metadata.get(key) {
                        update
                            .metadata
                            .get_or_insert_with(Default::default)
                            .insert(key.clone(), value.clone());
                    }
                }
            }
        }
        update
    };
    pending.clear();

    if update.is_empty() {
        return;
    }

    match inner.store.update(&inner.document_id, &update).await {
        Ok(_) => debug!(document_id = %inner.document_id, "debounced field autosave"),
        Err(e) => warn!(
            document_id = %inner.document_id,
            error = %e,
            "debounced field autosave failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::DocumentStore;
    use crate::editor::session::SessionOptions;
    use crate::editor::test_support::{open_session, settle};
    use std::time::Duration;

    const AUTOSAVE: Duration = Duration::from_secs(120);
    const DEBOUNCE: Duration = Duration::from_millis(1500);
    const EPSILON: Duration = Duration::from_millis(50);

    fn transcript_options() -> SessionOptions {
        SessionOptions::default()
            .track_meta("transcript")
            .debounce(Field::meta("transcript"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_autosave_fires_when_dirty() {
        let (session, store) = open_session("A", "hello", SessionOptions::default()).await;
        session.edit(Field::Content, "hello world").unwrap();

        time::advance(AUTOSAVE + EPSILON).await;
        settle().await;

        assert_eq!(store.snapshot_calls(), 1);
        assert!(!session.is_dirty());

        let history = session.history().await.unwrap();
        assert_eq!(history[0].change_type, ChangeType::Auto);
        assert_eq!(history[0].content, "hello world");
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_autosave_skips_clean_session() {
        let (session, store) = open_session("A", "hello", SessionOptions::default()).await;

        time::advance(AUTOSAVE * 3).await;
        settle().await;

        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.snapshot_calls(), 0);
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_autosave_failure_retries_next_tick() {
        let (session, store) = open_session("A", "hello", SessionOptions::default()).await;
        session.edit(Field::Content, "hello world").unwrap();

        store.fail_updates(true);
        time::advance(AUTOSAVE + EPSILON).await;
        settle().await;
        assert_eq!(store.snapshot_calls(), 0);
        assert!(session.is_dirty(), "failed background save keeps the draft dirty");

        store.fail_updates(false);
        time::advance(AUTOSAVE + EPSILON).await;
        settle().await;
        assert_eq!(store.snapshot_calls(), 1);
        assert!(!session.is_dirty());
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_field_save_waits_for_settle() {
        let (session, store) = open_session("A", "hello", transcript_options()).await;

        session.edit(Field::meta("transcript"), "first pass").unwrap();
        settle().await;
        time::advance(DEBOUNCE - Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(store.update_calls(), 0, "timer has not settled yet");

        // A new edit restarts the delay.
        session.edit(Field::meta("transcript"), "second pass").unwrap();
        settle().await;
        time::advance(DEBOUNCE - Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(store.update_calls(), 0);

        time::advance(Duration::from_millis(100) + EPSILON).await;
        settle().await;
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.snapshot_calls(), 0, "debounced path never writes a version");

        let document = store.get(session.document_id()).await.unwrap().unwrap();
        assert_eq!(document.metadata.get("transcript").unwrap(), "second pass");
        assert_eq!(document.content, "hello", "only the debounced field is persisted");
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_save_failure_is_dropped() {
        let (session, store) = open_session("A", "hello", transcript_options()).await;

        store.fail_updates(true);
        session.edit(Field::meta("transcript"), "lost words").unwrap();
        settle().await;
        time::advance(DEBOUNCE + EPSILON).await;
        settle().await;

        assert_eq!(store.update_calls(), 1);
        // Lossy path: no retry is scheduled until the field is edited again.
        time::advance(DEBOUNCE * 4).await;
        settle().await;
        assert_eq!(store.update_calls(), 1);
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_both_timers() {
        let (session, store) = open_session("A", "hello", transcript_options()).await;

        session.edit(Field::Content, "hello world").unwrap();
        session.edit(Field::meta("transcript"), "notes").unwrap();
        session.close();

        // Well past both intervals: nothing may reach the store.
        time::advance(AUTOSAVE * 5).await;
        settle().await;

        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.snapshot_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_tick_is_noop_while_save_in_flight() {
        let (session, store) = open_session("A", "hello", SessionOptions::default()).await;
        session.edit(Field::Content, "hello world").unwrap();

        store.stall_updates(true);
        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.save(ChangeType::Manual, None).await })
        };
        settle().await;
        assert!(session.is_saving());

        // A tick lands while the manual save is still running.
        time::advance(AUTOSAVE + EPSILON).await;
        settle().await;

        store.stall_updates(false);
        running.await.unwrap().unwrap();
        settle().await;

        assert_eq!(store.snapshot_calls(), 1, "the suppressed tick queued no retry");
        session.close();
    }
}
