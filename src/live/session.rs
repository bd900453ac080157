//! Live session: one producer thread applying transport input to a store.
//!
//! The producer coalesces bursts of input into batches bounded by a time
//! window and a unit count, applies each batch to a private copy of the
//! store and then publishes the copy in one step. Readers only ever see
//! whole batches.
//!
//! After a disconnect, a malformed message or a unit that does not follow
//! the store's sequence, the session drops its pending batch, asks for a
//! snapshot and ignores units until a valid snapshot arrives.

use super::message::{decode_message, LiveMessage, TransportEvent};
use crate::report::{ReportDocument, ReportStore, ReportUnit, UnitOutcome, UnitSink};
use crate::utils::config::LiveConfig;
use crate::utils::error::TransportError;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::io::BufRead;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Notifications from the producer thread
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A batch was published
    Published {
        applied: usize,
        next_log_index: u64,
    },

    /// The session needs a full snapshot before it can continue
    ResyncRequested { reason: String },

    /// A snapshot replaced the store
    SnapshotApplied { entries: usize },
}

enum Input {
    Transport(TransportEvent),
    Stop,
}

/// Cloneable handle for delivering transport events to a session
#[derive(Clone)]
pub struct LiveSender {
    tx: Sender<Input>,
}

impl LiveSender {
    /// # Errors
    /// * `TransportError::Disconnected` - If the session has stopped
    pub fn send(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.tx
            .send(Input::Transport(event))
            .map_err(|_| TransportError::Disconnected("live session stopped".to_string()))
    }

    pub fn send_message(&self, message: LiveMessage) -> Result<(), TransportError> {
        self.send(TransportEvent::Message(message))
    }
}

/// Mirrors recorder appends into a live session
impl UnitSink for LiveSender {
    fn publish(&mut self, unit: ReportUnit) {
        if let Err(e) = self.send_message(LiveMessage::Unit(unit)) {
            debug!("Dropping live unit: {}", e);
        }
    }

    fn resync(&mut self, document: ReportDocument) {
        if let Err(e) = self.send_message(LiveMessage::Snapshot { data: document }) {
            debug!("Dropping live snapshot: {}", e);
        }
    }
}

/// A running live session
pub struct LiveSession {
    sender: LiveSender,
    published: Arc<RwLock<Arc<ReportStore>>>,
    events: Receiver<SessionEvent>,
    handle: Option<JoinHandle<ReportStore>>,
}

impl LiveSession {
    /// Start a session over an empty store
    ///
    /// # Errors
    /// * `TransportError::Spawn` - If the producer thread cannot be started
    pub fn start(config: LiveConfig) -> Result<Self, TransportError> {
        Self::with_store(ReportStore::new(), config)
    }

    /// Start a session that continues from `store`
    pub fn with_store(store: ReportStore, config: LiveConfig) -> Result<Self, TransportError> {
        let (tx, rx) = channel();
        let (event_tx, events) = channel();
        let published = Arc::new(RwLock::new(Arc::new(store)));

        let producer = Producer {
            config,
            published: Arc::clone(&published),
            events: event_tx,
            awaiting_snapshot: false,
        };

        let handle = std::thread::Builder::new()
            .name("autopsy-live".to_string())
            .spawn(move || producer.run(rx))
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            sender: LiveSender { tx },
            published,
            events,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> LiveSender {
        self.sender.clone()
    }

    /// Latest published store
    pub fn snapshot(&self) -> Arc<ReportStore> {
        Arc::clone(&self.published.read())
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stop accepting input and return the final store
    ///
    /// Input already queued ahead of the stop is still applied.
    pub fn stop(mut self) -> ReportStore {
        self.shutdown()
    }

    /// Stop, returning the final store and every event not yet received
    pub fn finish(mut self) -> (ReportStore, Vec<SessionEvent>) {
        let store = self.shutdown();
        let events = self.events.try_iter().collect();
        (store, events)
    }

    fn shutdown(&mut self) -> ReportStore {
        let _ = self.sender.tx.send(Input::Stop);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(store)) => store,
            _ => {
                warn!("Live producer thread panicked; returning last published store");
                (*self.snapshot()).clone()
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.tx.send(Input::Stop);
            let _ = handle.join();
        }
    }
}

/// Feed JSON-lines transport input to a session
///
/// Each line becomes a message or a malformed event; a read error becomes
/// a disconnect.
///
/// # Returns
/// Number of lines delivered
pub fn feed_lines<R: BufRead>(reader: R, sender: &LiveSender) -> Result<usize, TransportError> {
    let mut delivered = 0;
    for line in reader.lines() {
        let event = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => TransportEvent::from(decode_message(&line)),
            Err(e) => TransportEvent::Disconnected {
                reason: e.to_string(),
            },
        };
        let disconnected = matches!(event, TransportEvent::Disconnected { .. });
        sender.send(event)?;
        delivered += 1;
        if disconnected {
            break;
        }
    }
    Ok(delivered)
}

struct Checkpoint {
    store: Arc<ReportStore>,
    from_snapshot: bool,
}

struct Producer {
    config: LiveConfig,
    published: Arc<RwLock<Arc<ReportStore>>>,
    events: Sender<SessionEvent>,
    awaiting_snapshot: bool,
}

impl Producer {
    fn run(mut self, rx: Receiver<Input>) -> ReportStore {
        let window = self.config.coalesce_window();
        let max_batch = self.config.max_batch.max(1);
        let mut stopping = false;

        while !stopping {
            let first = match rx.recv() {
                Ok(Input::Transport(event)) => event,
                Ok(Input::Stop) | Err(_) => break,
            };

            let mut batch = vec![first];
            let deadline = Instant::now() + window;
            while batch.len() < max_batch {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match rx.recv_timeout(remaining) {
                    Ok(Input::Transport(event)) => batch.push(event),
                    Ok(Input::Stop) | Err(RecvTimeoutError::Disconnected) => {
                        stopping = true;
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                }
            }

            self.apply_batch(batch);
        }

        let store = Arc::clone(&self.published.read());
        info!(
            "Live session stopped at log index {}",
            store.next_log_index()
        );
        (*store).clone()
    }

    fn apply_batch(&mut self, batch: Vec<TransportEvent>) {
        let base = Arc::clone(&self.published.read());
        // Last good state inside this batch: the base, or the latest valid snapshot
        let mut checkpoint = Checkpoint {
            store: Arc::clone(&base),
            from_snapshot: false,
        };
        let mut working = Arc::clone(&base);
        let mut applied = 0;
        let mut changed = false;

        debug!("Applying batch of {} transport events", batch.len());

        for event in batch {
            match event {
                TransportEvent::Message(LiveMessage::Snapshot { data }) => {
                    match ReportStore::from_document(data) {
                        Ok(store) => {
                            let entries = store.len();
                            working = Arc::new(store);
                            checkpoint = Checkpoint {
                                store: Arc::clone(&working),
                                from_snapshot: true,
                            };
                            changed = true;
                            applied = 0;
                            self.awaiting_snapshot = false;
                            self.notify(SessionEvent::SnapshotApplied { entries });
                        }
                        Err(e) => {
                            self.fault(&mut working, &checkpoint, &mut changed, &mut applied, e.to_string())
                        }
                    }
                }
                TransportEvent::Message(LiveMessage::Unit(unit)) => {
                    if self.awaiting_snapshot {
                        debug!(
                            "Ignoring unit {} while awaiting snapshot",
                            unit.value_group.log_index
                        );
                        continue;
                    }
                    match Arc::make_mut(&mut working).apply_unit(unit) {
                        Ok(UnitOutcome::Applied(_)) => {
                            applied += 1;
                            changed = true;
                        }
                        Ok(UnitOutcome::Duplicate(log_index)) => {
                            debug!("Skipping duplicate unit {}", log_index)
                        }
                        Err(e) => {
                            self.fault(&mut working, &checkpoint, &mut changed, &mut applied, e.to_string())
                        }
                    }
                }
                TransportEvent::Malformed(reason) => {
                    self.fault(&mut working, &checkpoint, &mut changed, &mut applied, reason)
                }
                TransportEvent::Disconnected { reason } => self.fault(
                    &mut working,
                    &checkpoint,
                    &mut changed,
                    &mut applied,
                    format!("disconnected: {}", reason),
                ),
            }
        }

        if changed {
            let next_log_index = working.next_log_index();
            *self.published.write() = working;
            self.notify(SessionEvent::Published {
                applied,
                next_log_index,
            });
        }
    }

    /// Drop the units applied since the checkpoint and wait for a snapshot
    ///
    /// A snapshot applied earlier in the same batch survives the fault.
    fn fault(
        &mut self,
        working: &mut Arc<ReportStore>,
        checkpoint: &Checkpoint,
        changed: &mut bool,
        applied: &mut usize,
        reason: String,
    ) {
        *working = Arc::clone(&checkpoint.store);
        *changed = checkpoint.from_snapshot;
        *applied = 0;

        if !self.awaiting_snapshot {
            warn!("Live input fault, requesting snapshot: {}", reason);
            self.awaiting_snapshot = true;
            self.notify(SessionEvent::ResyncRequested { reason });
        } else {
            debug!("Live input fault while awaiting snapshot: {}", reason);
        }
    }

    fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CallSiteKey, NewEntry};
    use std::time::Duration;

    fn source(n: u32) -> ReportStore {
        let mut store = ReportStore::new();
        for i in 0..n {
            store
                .append(CallSiteKey::new("src/w.rs", 1 + i % 3), NewEntry::count("work", i as i64 % 2))
                .unwrap();
        }
        store
    }

    fn config() -> LiveConfig {
        LiveConfig {
            coalesce_window_ms: 5,
            max_batch: 4,
        }
    }

    #[test]
    fn test_units_in_order_match_batch_store() {
        let expected = source(10);
        let session = LiveSession::start(config()).unwrap();
        let sender = session.sender();
        for i in 0..10 {
            sender
                .send_message(LiveMessage::Unit(expected.unit(i).unwrap()))
                .unwrap();
        }

        let store = session.stop();
        assert_eq!(store, expected);
    }

    #[test]
    fn test_gap_requests_resync_and_snapshot_recovers() {
        let expected = source(6);
        let session = LiveSession::start(config()).unwrap();
        let sender = session.sender();

        sender.send_message(LiveMessage::Unit(expected.unit(0).unwrap())).unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(2).unwrap())).unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(3).unwrap())).unwrap();

        loop {
            match session.events().recv_timeout(Duration::from_secs(5)).unwrap() {
                SessionEvent::ResyncRequested { .. } => break,
                _ => continue,
            }
        }

        sender
            .send_message(LiveMessage::Snapshot {
                data: source(4).to_document(),
            })
            .unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(4).unwrap())).unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(5).unwrap())).unwrap();

        assert_eq!(session.stop(), expected);
    }

    #[test]
    fn test_disconnect_discards_pending_units() {
        let expected = source(3);
        let session = LiveSession::start(LiveConfig {
            coalesce_window_ms: 1_000,
            max_batch: 100,
        })
        .unwrap();
        let sender = session.sender();

        sender.send_message(LiveMessage::Unit(expected.unit(0).unwrap())).unwrap();
        sender
            .send(TransportEvent::Disconnected {
                reason: "socket closed".to_string(),
            })
            .unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(1).unwrap())).unwrap();

        let store = session.stop();
        assert!(store.is_empty());
    }

    fn run_snapshot_then_malformed(config: LiveConfig, gap: Duration) -> ReportStore {
        let session = LiveSession::start(config).unwrap();
        let sender = session.sender();
        sender
            .send_message(LiveMessage::Snapshot {
                data: source(3).to_document(),
            })
            .unwrap();
        std::thread::sleep(gap);
        sender
            .send(TransportEvent::Malformed("bad line".to_string()))
            .unwrap();
        sender
            .send(TransportEvent::Malformed("bad line".to_string()))
            .unwrap();
        session.stop()
    }

    #[test]
    fn test_fault_after_snapshot_in_same_batch_keeps_snapshot() {
        let coalesced = run_snapshot_then_malformed(
            LiveConfig {
                coalesce_window_ms: 1_000,
                max_batch: 100,
            },
            Duration::ZERO,
        );
        let separate = run_snapshot_then_malformed(
            LiveConfig {
                coalesce_window_ms: 0,
                max_batch: 1,
            },
            Duration::from_millis(100),
        );

        assert_eq!(coalesced, source(3));
        assert_eq!(coalesced, separate);
    }

    #[test]
    fn test_fault_drops_only_units_after_snapshot() {
        let expected = source(5);
        let session = LiveSession::start(LiveConfig {
            coalesce_window_ms: 1_000,
            max_batch: 100,
        })
        .unwrap();
        let sender = session.sender();

        sender
            .send_message(LiveMessage::Snapshot {
                data: source(3).to_document(),
            })
            .unwrap();
        sender.send_message(LiveMessage::Unit(expected.unit(3).unwrap())).unwrap();
        sender
            .send(TransportEvent::Disconnected {
                reason: "reset".to_string(),
            })
            .unwrap();

        let (store, events) = session.finish();
        assert_eq!(store, source(3));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ResyncRequested { .. })));
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let expected = source(2);
        let session = LiveSession::start(config()).unwrap();
        let sender = session.sender();
        for i in [0, 0, 1, 1, 0] {
            sender
                .send_message(LiveMessage::Unit(expected.unit(i).unwrap()))
                .unwrap();
        }
        assert_eq!(session.stop(), expected);
    }

    #[test]
    fn test_readers_see_published_snapshots() {
        let expected = source(3);
        let session = LiveSession::start(config()).unwrap();
        let before = session.snapshot();

        session
            .sender()
            .send_message(LiveMessage::Snapshot {
                data: expected.to_document(),
            })
            .unwrap();

        loop {
            match session.events().recv_timeout(Duration::from_secs(5)).unwrap() {
                SessionEvent::Published { .. } => break,
                _ => continue,
            }
        }

        assert!(before.is_empty());
        assert_eq!(*session.snapshot(), expected);
        drop(session);
    }

    #[test]
    fn test_feed_lines() {
        let expected = source(2);
        let mut input = String::new();
        for i in 0..2 {
            let message = LiveMessage::Unit(expected.unit(i).unwrap());
            input.push_str(&crate::live::message::encode_message(&message).unwrap());
            input.push('\n');
        }
        input.push('\n');

        let session = LiveSession::start(config()).unwrap();
        let delivered = feed_lines(input.as_bytes(), &session.sender()).unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(session.stop(), expected);
    }
}
