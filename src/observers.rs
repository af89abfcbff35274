//! Ordered fan-out of classified gesture events to subscribers.
//!
//! Every publish is handed to a [`DeliveryContext`] as one job. When the job
//! runs it snapshots the subscriber list, so subscribing or unsubscribing from
//! inside a callback only affects later events.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use log::error;
use serde::Serialize;

use crate::geometry::Rect;
use crate::gestures::{GestureKind, Phase};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GestureEvent {
    Tracked {
        kind: GestureKind,
        rect: Option<Rect>,
        phase: Phase,
    },
    Clicked {
        kind: GestureKind,
        rect: Rect,
    },
    DoubleClicked {
        kind: GestureKind,
        rect: Rect,
    },
}

impl GestureEvent {
    pub fn kind(&self) -> GestureKind {
        match self {
            Self::Tracked { kind, .. } | Self::Clicked { kind, .. } | Self::DoubleClicked { kind, .. } => {
                *kind
            }
        }
    }
}

/// Callbacks must not fail; a panicking observer is logged and skipped.
#[allow(unused_variables)]
pub trait GestureObserver: Send + Sync {
    fn tracked(&self, kind: GestureKind, rect: Option<Rect>, phase: Phase) {}
    fn clicked(&self, kind: GestureKind, rect: Rect) {}
    fn double_clicked(&self, kind: GestureKind, rect: Rect) {}
}

/// Observer that keeps every event it receives, in order.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<GestureEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GestureEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<GestureEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn push(&self, ev: GestureEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ev);
    }
}

impl GestureObserver for Recorder {
    fn tracked(&self, kind: GestureKind, rect: Option<Rect>, phase: Phase) {
        self.push(GestureEvent::Tracked { kind, rect, phase });
    }
    fn clicked(&self, kind: GestureKind, rect: Rect) {
        self.push(GestureEvent::Clicked { kind, rect });
    }
    fn double_clicked(&self, kind: GestureKind, rect: Rect) {
        self.push(GestureEvent::DoubleClicked { kind, rect });
    }
}

pub type Job = Box<dyn FnOnce() + Send>;

/// Where observer callbacks run.
pub trait DeliveryContext: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs callbacks inline on the publishing thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl DeliveryContext for Immediate {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Buffers callbacks until the owning loop calls [`Queued::drain`].
pub struct Queued {
    tx: Sender<Job>,
    rx: Mutex<Receiver<Job>>,
}

impl Default for Queued {
    fn default() -> Self {
        Self::new()
    }
}

impl Queued {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Runs every queued delivery. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        loop {
            // release the receiver before running, a job may publish again
            let job = {
                let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
                rx.try_recv()
            };
            match job {
                Ok(job) => {
                    job();
                    n += 1;
                }
                Err(_) => return n,
            }
        }
    }
}

impl DeliveryContext for Queued {
    fn dispatch(&self, job: Job) {
        // the receiver lives as long as self, send only fails after drop
        let _ = self.tx.send(job);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = Vec<(SubscriptionId, Arc<dyn GestureObserver>)>;

#[derive(Clone)]
pub struct ObserverHub {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
    context: Arc<dyn DeliveryContext>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(Arc::new(Immediate))
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl ObserverHub {
    pub fn new(context: Arc<dyn DeliveryContext>) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            context,
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn GestureObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, event: GestureEvent) {
        let subscribers = Arc::clone(&self.subscribers);
        self.context.dispatch(Box::new(move || {
            let snapshot: Subscribers = subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for (id, observer) in snapshot {
                let res = panic::catch_unwind(AssertUnwindSafe(|| deliver(observer.as_ref(), &event)));
                if res.is_err() {
                    error!("observer {:?} panicked on {:?}", id, event);
                }
            }
        }));
    }
}

fn deliver(observer: &dyn GestureObserver, event: &GestureEvent) {
    match *event {
        GestureEvent::Tracked { kind, rect, phase } => observer.tracked(kind, rect, phase),
        GestureEvent::Clicked { kind, rect } => observer.clicked(kind, rect),
        GestureEvent::DoubleClicked { kind, rect } => observer.double_clicked(kind, rect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn click(x: f64) -> GestureEvent {
        GestureEvent::Clicked {
            kind: GestureKind::PrimaryClick,
            rect: Rect::new(x, 0.0, 10.0, 10.0),
        }
    }

    struct Tagger {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl GestureObserver for Tagger {
        fn clicked(&self, _: GestureKind, _: Rect) {
            self.log.lock().unwrap().push(self.tag);
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let hub = ObserverHub::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            hub.subscribe(Arc::new(Tagger {
                tag,
                log: log.clone(),
            }));
        }
        hub.publish(click(0.0));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_observer() {
        let hub = ObserverHub::default();
        let a = Recorder::new();
        let b = Recorder::new();
        let ida = hub.subscribe(Arc::new(a.clone()));
        hub.subscribe(Arc::new(b.clone()));
        assert!(hub.unsubscribe(ida));
        assert!(!hub.unsubscribe(ida));
        hub.publish(click(1.0));
        assert!(a.events().is_empty());
        assert_eq!(b.events(), vec![click(1.0)]);
    }

    struct SelfRemover {
        hub: ObserverHub,
        id: OnceLock<SubscriptionId>,
        late: Recorder,
        seen: Recorder,
    }

    impl GestureObserver for SelfRemover {
        fn clicked(&self, kind: GestureKind, rect: Rect) {
            self.seen.clicked(kind, rect);
            if let Some(id) = self.id.get() {
                self.hub.unsubscribe(*id);
            }
            self.hub.subscribe(Arc::new(self.late.clone()));
        }
    }

    #[test]
    fn changes_during_delivery_apply_to_next_event() {
        let hub = ObserverHub::default();
        let remover = Arc::new(SelfRemover {
            hub: hub.clone(),
            id: OnceLock::new(),
            late: Recorder::new(),
            seen: Recorder::new(),
        });
        let tail = Recorder::new();
        let id = hub.subscribe(remover.clone());
        let _ = remover.id.set(id);
        hub.subscribe(Arc::new(tail.clone()));

        hub.publish(click(1.0));
        // snapshot still included tail, late subscriber missed the first event
        assert_eq!(tail.events().len(), 1);
        assert!(remover.late.events().is_empty());

        hub.publish(click(2.0));
        assert_eq!(remover.seen.events().len(), 1);
        assert_eq!(remover.late.events(), vec![click(2.0)]);
        assert_eq!(tail.events().len(), 2);
    }

    struct Boom;

    impl GestureObserver for Boom {
        fn clicked(&self, _: GestureKind, _: Rect) {
            panic!("observer failure");
        }
    }

    #[test]
    fn panicking_observer_does_not_starve_others() {
        let hub = ObserverHub::default();
        let rec = Recorder::new();
        hub.subscribe(Arc::new(Boom));
        hub.subscribe(Arc::new(rec.clone()));
        hub.publish(click(3.0));
        assert_eq!(rec.events(), vec![click(3.0)]);
    }

    #[test]
    fn queued_context_defers_until_drain() {
        let queue = Arc::new(Queued::new());
        let hub = ObserverHub::new(queue.clone());
        let rec = Recorder::new();
        hub.subscribe(Arc::new(rec.clone()));

        hub.publish(click(1.0));
        hub.publish(click(2.0));
        assert!(rec.events().is_empty());

        assert_eq!(queue.drain(), 2);
        assert_eq!(rec.events(), vec![click(1.0), click(2.0)]);
    }
}
