//! Host collaborators
//!
//! The application runtime a session runs inside is reached only through
//! these traits. Callbacks may arrive on any thread, so everything is
//! `Send + Sync` and synchronous.

use bytes::Bytes;
use specsync_artifact::ArtifactSet;
use specsync_cache::ReflectorSpec;
use std::fmt::Debug;
use std::sync::Arc;

/// Handle returned by a subscription, used to undo it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A unit of code the host runtime just loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedUnit {
    /// Unit name (`/` separates packages)
    pub name: String,
    /// Type name of the parent of the loader that produced the unit
    pub loader_parent: String,
    /// Raw unit bytes
    pub bytes: Bytes,
}

impl LoadedUnit {
    /// Create loaded unit
    #[must_use]
    pub fn new(name: impl Into<String>, loader_parent: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            loader_parent: loader_parent.into(),
            bytes: bytes.into(),
        }
    }
}

/// Observer invoked for every unit loaded while subscribed
pub trait LoadHook: Send + Sync {
    /// Called once per loaded unit, from the loading thread
    fn on_load(&self, unit: &LoadedUnit);
}

/// Where load hooks are attached
pub trait LoadRegistry: Send + Sync + Debug {
    /// Start delivering loads to `hook`
    fn subscribe(&self, hook: Arc<dyn LoadHook>) -> SubscriptionId;

    /// Stop delivering to a previous subscription
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Kinds of input events forwarded to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Key,
    Mouse,
    MouseMotion,
    MouseWheel,
}

/// A user input event seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Event category
    pub kind: InputKind,
    /// Host key or button code
    pub code: i32,
}

/// Receives input events
pub trait InputObserver: Send + Sync {
    fn on_input(&self, event: &InputEvent);
}

/// Source of input events
pub trait InputSource: Send + Sync + Debug {
    /// Register `observer`
    fn add_observer(&self, observer: Arc<dyn InputObserver>) -> SubscriptionId;

    /// Remove a registered observer
    fn remove_observer(&self, id: SubscriptionId);
}

/// Event dispatcher worker owned by the host
pub trait Dispatcher: Send + Sync + Debug {
    /// Start the worker
    fn start(&self);

    /// Deliver an input event to listeners
    fn dispatch(&self, event: &InputEvent);

    /// Stop the worker
    fn close(&self);
}

/// Automation controller; stopping it halts any running automation
pub trait Controller: Send + Sync + Debug {
    fn stop(&self);
}

/// The client environment a session is bound to
pub trait ClientHost: Send + Sync + Debug {
    /// Artifacts already known from direct extraction
    fn known_artifacts(&self) -> ArtifactSet;

    /// Hand the bound spec to the automation capability
    fn reflect(&self, spec: ReflectorSpec);

    /// Called after a spec was applied (menu refresh)
    fn on_applied(&self);

    /// Cancel timers the host scheduled for this session
    fn cancel_timers(&self);

    /// Detach the client from the host
    fn detach_client(&self);

    /// Give up the owner slot the session occupies
    fn release_owner(&self);
}

/// Everything a session talks to
#[derive(Debug, Clone)]
pub struct SessionHost {
    /// Load notifications
    pub registry: Arc<dyn LoadRegistry>,
    /// Running client the spec is reflected into
    pub client: Arc<dyn ClientHost>,
    /// Queue for captured input
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Input event source
    pub input: Arc<dyn InputSource>,
    /// Top-level client controller
    pub controller: Arc<dyn Controller>,
}

/// Forwards input events to the dispatcher
#[derive(Debug)]
pub(crate) struct DispatchObserver {
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
}

impl InputObserver for DispatchObserver {
    fn on_input(&self, event: &InputEvent) {
        self.dispatcher.dispatch(event);
    }
}
