//! Recording host
//!
//! One object playing every host collaborator of a capture session, counting
//! each call so tests can assert on what a session did.

use parking_lot::Mutex;
use specsync_artifact::ArtifactSet;
use specsync_cache::ReflectorSpec;
use specsync_session::{
    ClientHost, Controller, Dispatcher, InputEvent, InputObserver, InputSource, LoadHook,
    LoadRegistry, LoadedUnit, SessionHost, SubscriptionId,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Named call counters
#[derive(Debug, Default)]
pub struct Counters {
    pub subscribed: AtomicUsize,
    pub unsubscribed: AtomicUsize,
    pub observers_added: AtomicUsize,
    pub observers_removed: AtomicUsize,
    pub dispatcher_started: AtomicUsize,
    pub dispatched: AtomicUsize,
    pub dispatcher_closed: AtomicUsize,
    pub controller_stopped: AtomicUsize,
    pub applied: AtomicUsize,
    pub timers_cancelled: AtomicUsize,
    pub detached: AtomicUsize,
    pub released: AtomicUsize,
}

impl Counters {
    /// Read a counter
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

type Callback = Box<dyn Fn() + Send + Sync>;

/// Host fake recording every interaction
#[derive(Default)]
pub struct RecordingHost {
    pub counters: Counters,
    known: Mutex<ArtifactSet>,
    hooks: Mutex<Vec<(SubscriptionId, Arc<dyn LoadHook>)>>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn InputObserver>)>>,
    reflected: Mutex<Vec<ReflectorSpec>>,
    on_reflect: Mutex<Option<Callback>>,
    on_dispatcher_start: Mutex<Option<Callback>>,
    next_id: AtomicU64,
}

impl fmt::Debug for RecordingHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingHost")
            .field("counters", &self.counters)
            .field("hooks", &self.hooks.lock().len())
            .finish_non_exhaustive()
    }
}

impl RecordingHost {
    /// Host whose extraction already produced `known`
    pub fn new(known: ArtifactSet) -> Arc<Self> {
        let host = Self::default();
        *host.known.lock() = known;
        Arc::new(host)
    }

    /// Bundle this host as every collaborator of a session
    pub fn session_host(self: &Arc<Self>) -> SessionHost {
        SessionHost {
            registry: Arc::clone(self) as Arc<dyn LoadRegistry>,
            client: Arc::clone(self) as Arc<dyn ClientHost>,
            dispatcher: Arc::clone(self) as Arc<dyn Dispatcher>,
            input: Arc::clone(self) as Arc<dyn InputSource>,
            controller: Arc::clone(self) as Arc<dyn Controller>,
        }
    }

    /// Simulate the runtime loading `unit`
    pub fn load(&self, unit: &LoadedUnit) {
        let hooks: Vec<_> = self.hooks.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for hook in hooks {
            hook.on_load(unit);
        }
    }

    /// Simulate a user input event
    pub fn input(&self, event: &InputEvent) {
        let observers: Vec<_> = self.observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer.on_input(event);
        }
    }

    /// Run `callback` from inside every `reflect`
    pub fn on_reflect(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_reflect.lock() = Some(Box::new(callback));
    }

    /// Run `callback` from inside every dispatcher `start`
    pub fn on_dispatcher_start(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_dispatcher_start.lock() = Some(Box::new(callback));
    }

    /// Number of attached load hooks
    pub fn active_hooks(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Number of registered input observers
    pub fn active_observers(&self) -> usize {
        self.observers.lock().len()
    }

    /// Specs handed to `reflect`
    pub fn reflected(&self) -> Vec<ReflectorSpec> {
        self.reflected.lock().clone()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl LoadRegistry for RecordingHost {
    fn subscribe(&self, hook: Arc<dyn LoadHook>) -> SubscriptionId {
        self.counters.subscribed.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        self.hooks.lock().push((id, hook));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.counters.unsubscribed.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().retain(|(h, _)| *h != id);
    }
}

impl InputSource for RecordingHost {
    fn add_observer(&self, observer: Arc<dyn InputObserver>) -> SubscriptionId {
        self.counters.observers_added.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        self.observers.lock().push((id, observer));
        id
    }

    fn remove_observer(&self, id: SubscriptionId) {
        self.counters.observers_removed.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().retain(|(o, _)| *o != id);
    }
}

impl Dispatcher for RecordingHost {
    fn start(&self) {
        self.counters.dispatcher_started.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = self.on_dispatcher_start.lock().as_ref() {
            callback();
        }
    }

    fn dispatch(&self, _event: &InputEvent) {
        self.counters.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.counters.dispatcher_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Controller for RecordingHost {
    fn stop(&self) {
        self.counters.controller_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl ClientHost for RecordingHost {
    fn known_artifacts(&self) -> ArtifactSet {
        self.known.lock().clone()
    }

    fn reflect(&self, spec: ReflectorSpec) {
        self.reflected.lock().push(spec);
        if let Some(callback) = self.on_reflect.lock().as_ref() {
            callback();
        }
    }

    fn on_applied(&self) {
        self.counters.applied.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel_timers(&self) {
        self.counters.timers_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn detach_client(&self) {
        self.counters.detached.fetch_add(1, Ordering::SeqCst);
    }

    fn release_owner(&self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}
