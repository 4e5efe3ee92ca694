//! The public transport endpoint
//!
//! An endpoint composes a [`SharedSegment`], a [`Notifier`] and one
//! background listener thread. `write` publishes a message into the slot and
//! signals the peer; the listener blocks on the notifier and hands each
//! received payload to the registered callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::{AccessMode, HatchConfig};
use crate::error::{HatchError, Result};
use crate::frame;
use crate::notify::Notifier;
use crate::segment::SharedSegment;

/// Identity of the endpoint a message arrived on, handed to the callback
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    /// Segment name the endpoint is bound to
    pub name: String,
    /// Whether this endpoint created the segment
    pub is_owner: bool,
    /// Payload capacity in bytes
    pub capacity: usize,
    /// Total mapped size including the descriptor and length prefix
    pub total_mapped_size: usize,
}

type Callback = Arc<dyn Fn(&[u8], &EndpointInfo) + Send + Sync + 'static>;

struct HandlerSlot {
    callback: Option<Callback>,
}

/// State shared between the endpoint handle and its listener thread
struct Shared {
    segment: SharedSegment,
    notifier: Notifier,
    info: EndpointInfo,
    access: AccessMode,
    /// Effective auto-clear: the configured flag, forced off for read-only
    /// mappings which cannot store to the length word
    auto_clear: bool,
    handler: Mutex<HandlerSlot>,
    handler_cv: Condvar,
    stop: AtomicBool,
}

/// One side of a single-slot shared-memory message transport
///
/// Create the owning side with [`Endpoint::create`] and any number of peers
/// with [`Endpoint::attach`]; the supported pattern is one owner and one
/// attacher taking alternating turns. Dropping an endpoint tears it down,
/// or call [`Endpoint::dispose`] to do so explicitly.
pub struct Endpoint {
    shared: Option<Arc<Shared>>,
    listener: Option<JoinHandle<()>>,
    info: EndpointInfo,
}

impl Endpoint {
    /// Create the segment and become its owner
    ///
    /// Fails with `SegmentAlreadyExists` when the name is taken and with
    /// `OwnerReadOnly` for a read-only configuration: the owner has to write
    /// the descriptor. Construction is atomic; on any failure every already
    /// acquired OS object is released again.
    pub fn create(config: HatchConfig) -> Result<Self> {
        config.validate()?;
        if config.access == AccessMode::ReadOnly {
            return Err(HatchError::OwnerReadOnly);
        }

        let segment = SharedSegment::create(&config.name, frame::total_size(config.capacity))?;
        Self::start(config, segment, true)
    }

    /// Attach to a segment someone else owns
    ///
    /// Fails with `SegmentNotFound` when no owner has created the name yet;
    /// callers expecting to race the owner's startup may retry after a
    /// delay. The configured capacity is ignored, the segment descriptor is
    /// authoritative for geometry.
    pub fn attach(config: HatchConfig) -> Result<Self> {
        let segment = SharedSegment::open(&config.name, config.access)?;
        if segment.size() < frame::MIN_TOTAL_SIZE {
            return Err(HatchError::InvalidDescriptor {
                name: config.name.clone(),
                total_size: segment.size() as u64,
            });
        }
        Self::start(config, segment, false)
    }

    fn start(config: HatchConfig, segment: SharedSegment, is_owner: bool) -> Result<Self> {
        let notifier = Notifier::open_or_create(&config.name, is_owner)?;

        let info = EndpointInfo {
            name: config.name.clone(),
            is_owner,
            capacity: frame::capacity_of(&segment),
            total_mapped_size: segment.size(),
        };

        let shared = Arc::new(Shared {
            segment,
            notifier,
            info: info.clone(),
            access: config.access,
            auto_clear: config.auto_clear && config.access == AccessMode::ReadWrite,
            handler: Mutex::new(HandlerSlot { callback: None }),
            handler_cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let listener = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(format!("memhatch-{}", info.name))
                .spawn(move || listener_loop(&shared))
                .map_err(HatchError::ListenerSpawn)?
        };

        Ok(Self {
            shared: Some(shared),
            listener: Some(listener),
            info,
        })
    }

    /// Publish `payload` and wake the peer
    ///
    /// Returns once the wake has been issued, not once anyone consumed the
    /// message. A still unread previous message is silently overwritten; the
    /// slot holds at most one pending message.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let shared = self.shared.as_ref().ok_or(HatchError::Disposed)?;
        if shared.access == AccessMode::ReadOnly {
            return Err(HatchError::ReadOnly {
                name: shared.info.name.clone(),
            });
        }

        frame::encode(&shared.segment, payload)?;
        shared.notifier.signal();
        Ok(())
    }

    /// Register the message callback, replacing any previous one
    ///
    /// The callback runs synchronously on the listener thread with the
    /// payload and this endpoint's identity. Until a callback is registered
    /// the listener stays idle and does not compete for wakes; a message
    /// already pending at registration time is delivered right away.
    pub fn on_message<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&[u8], &EndpointInfo) + Send + Sync + 'static,
    {
        let shared = self.shared.as_ref().ok_or(HatchError::Disposed)?;
        let mut slot = shared.handler.lock().unwrap();
        slot.callback = Some(Arc::new(callback));
        shared.handler_cv.notify_all();
        Ok(())
    }

    /// Tear the endpoint down
    ///
    /// Stops and joins the listener, releases the mapping and the notifier,
    /// and (for the owner) unlinks both OS names. Idempotent; also invoked
    /// by `Drop`, so an endpoint going out of scope cleans up the same way.
    ///
    /// The shutdown wake reaches every waiter on the name, including the
    /// peer's listener. With auto-clear off the slot is never emptied, so
    /// that wake (like any other) makes the peer re-deliver a still
    /// unconsumed message; run with auto-clear when duplicate delivery on
    /// spurious wakes matters.
    pub fn dispose(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        {
            // Setting stop under the handler lock pairs with the idle wait,
            // so the wake below cannot slip between its check and its sleep.
            let _slot = shared.handler.lock().unwrap();
            shared.stop.store(true, Ordering::Release);
            shared.handler_cv.notify_all();
        }
        shared.notifier.signal_all();

        if let Some(listener) = self.listener.take() {
            if listener.thread().id() != std::thread::current().id() {
                let _ = listener.join();
            }
        }

        tracing::debug!("endpoint '{}' disposed", self.info.name);
    }

    /// Segment name this endpoint is bound to
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Payload capacity in bytes
    pub fn capacity(&self) -> usize {
        self.info.capacity
    }

    /// Total mapped size including descriptor and length prefix
    pub fn total_mapped_size(&self) -> usize {
        self.info.total_mapped_size
    }

    /// Whether this endpoint created the segment
    pub fn is_owner(&self) -> bool {
        self.info.is_owner
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn listener_loop(shared: &Shared) {
    tracing::debug!("listener for '{}' started", shared.info.name);

    // Idle: a listener without a callback must not compete for wakes, the
    // notifier delivers each signal to exactly one waiter. Callbacks are
    // replaced but never removed, so this gate is passed once.
    {
        let mut slot = shared.handler.lock().unwrap();
        while slot.callback.is_none() && !shared.stop.load(Ordering::Acquire) {
            slot = shared.handler_cv.wait(slot).unwrap();
        }
    }

    // Snapshot first, then drain, then wait against the snapshot. A signal
    // issued at any point after the snapshot (a write landing mid-drain, or
    // teardown's bump) moves the word and the wait returns immediately, so
    // nothing that happens while we are busy can strand us asleep. The first
    // drain also picks up a message that arrived while we were idle and had
    // its wake swallowed.
    loop {
        let seen = shared.notifier.snapshot();
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        drain(shared);
        shared.notifier.wait_from(seen);
    }

    tracing::debug!("listener for '{}' stopped", shared.info.name);
}

/// Deliver the pending message, if there is one
fn drain(shared: &Shared) {
    let Some(payload) = frame::decode(&shared.segment, shared.auto_clear) else {
        return;
    };

    let callback = shared.handler.lock().unwrap().callback.clone();
    if let Some(callback) = callback {
        // The callback is user code on our thread; a panic must not take
        // the listener down with it.
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            callback(&payload, &shared.info);
        }));
        if delivered.is_err() {
            tracing::warn!(
                "endpoint '{}': message callback panicked, listener continues",
                shared.info.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn test_name(tag: &str) -> String {
        format!("{}_{}", tag, std::process::id())
    }

    fn pair(tag: &str) -> (Endpoint, Endpoint) {
        let name = test_name(tag);
        let owner = Endpoint::create(HatchConfig {
            auto_clear: true,
            ..HatchConfig::new(name.clone())
        })
        .unwrap();
        let attacher = Endpoint::attach(HatchConfig {
            auto_clear: true,
            ..HatchConfig::new(name)
        })
        .unwrap();
        (owner, attacher)
    }

    #[test]
    fn owner_cannot_be_read_only() {
        let config = HatchConfig {
            access: AccessMode::ReadOnly,
            ..HatchConfig::new(test_name("ep_owner_ro"))
        };

        assert!(matches!(
            Endpoint::create(config),
            Err(HatchError::OwnerReadOnly)
        ));
    }

    #[test]
    fn read_only_attacher_cannot_write() {
        let name = test_name("ep_ro_write");
        let _owner = Endpoint::create(HatchConfig::new(name.clone())).unwrap();
        let attacher = Endpoint::attach(HatchConfig {
            access: AccessMode::ReadOnly,
            ..HatchConfig::new(name)
        })
        .unwrap();

        assert!(matches!(
            attacher.write(b"nope"),
            Err(HatchError::ReadOnly { .. })
        ));
    }

    #[test]
    fn write_after_dispose_is_rejected() {
        let mut owner = Endpoint::create(HatchConfig::new(test_name("ep_disposed"))).unwrap();
        owner.dispose();

        assert!(matches!(owner.write(b"late"), Err(HatchError::Disposed)));
        assert!(matches!(
            owner.on_message(|_, _| {}),
            Err(HatchError::Disposed)
        ));
    }

    #[test]
    fn double_dispose_is_harmless() {
        let mut owner = Endpoint::create(HatchConfig::new(test_name("ep_double"))).unwrap();
        owner.dispose();
        owner.dispose();
    }

    #[test]
    fn accessors_survive_dispose() {
        let name = test_name("ep_accessors");
        let mut owner = Endpoint::create(HatchConfig {
            capacity: 64,
            ..HatchConfig::new(name.clone())
        })
        .unwrap();
        owner.dispose();

        assert_eq!(owner.name(), name);
        assert_eq!(owner.capacity(), 64);
        assert_eq!(owner.total_mapped_size(), frame::total_size(64));
        assert!(owner.is_owner());
    }

    #[test]
    fn second_callback_replaces_the_first() {
        let (owner, attacher) = pair("ep_replace");
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        attacher.on_message(move |_, _| first.send(1).unwrap()).unwrap();
        attacher.on_message(move |_, _| tx.send(2).unwrap()).unwrap();

        owner.write(b"ping").unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn pending_message_is_delivered_on_registration() {
        let (owner, attacher) = pair("ep_pending");

        // No callback anywhere yet: the wake is lost, the message stays put.
        owner.write(b"early").unwrap();

        let (tx, rx) = mpsc::channel();
        attacher
            .on_message(move |payload, _| tx.send(payload.to_vec()).unwrap())
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            b"early"
        );
    }
}
