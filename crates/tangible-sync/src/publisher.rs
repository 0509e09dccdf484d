//! Subscriber registry
//!
//! Each engine event has a capability trait. A [`Publisher`] holds the
//! subscribers of one capability; [`Publishers`] bundles all seven and
//! handles both registration styles:
//!
//! - **Interface style**: a type implements some capability traits plus
//!   [`Subscriber`], exposing views for the capabilities it has, and is
//!   registered once with [`Publishers::subscribe`].
//! - **Delegate style**: a closure is wrapped in a one-method adapter and
//!   registered in the same publisher; the returned [`Subscription`] removes
//!   it again.
//!
//! Both styles share one publisher per event, so a single publish reaches
//! every subscriber exactly once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::error;

use tangible_core::{EngineEvent, Pattern, TangibleHandle};

use crate::dispatcher::panic_message;

/// Notified when the engine connects
pub trait OnEngineConnected: Send + Sync {
    fn on_engine_connected(&self);
}

/// Notified when the engine loses its connection
pub trait OnEngineDisconnected: Send + Sync {
    fn on_engine_disconnected(&self);
}

/// Notified when a connection attempt fails
pub trait OnEngineFailedToConnect: Send + Sync {
    fn on_engine_failed_to_connect(&self);
}

/// Notified when the pattern set is replaced
pub trait OnPatternsChanged: Send + Sync {
    fn on_patterns_changed(&self, patterns: &Arc<Vec<Pattern>>);
}

/// Notified when a tangible appears
pub trait OnTangibleAdded: Send + Sync {
    fn on_tangible_added(&self, tangible: &TangibleHandle);
}

/// Notified when a live tangible moves or rotates
pub trait OnTangibleUpdated: Send + Sync {
    fn on_tangible_updated(&self, tangible: &TangibleHandle);
}

/// Notified when a tangible disappears
pub trait OnTangibleRemoved: Send + Sync {
    fn on_tangible_removed(&self, tangible: &TangibleHandle);
}

/// Capability views of an interface-style subscriber
///
/// Every view defaults to `None`; override the ones the type implements:
///
/// ```rust,ignore
/// impl Subscriber for Hud {
///     fn as_tangible_added(self: Arc<Self>) -> Option<Arc<dyn OnTangibleAdded>> {
///         Some(self)
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync {
    fn as_engine_connected(self: Arc<Self>) -> Option<Arc<dyn OnEngineConnected>> {
        None
    }

    fn as_engine_disconnected(self: Arc<Self>) -> Option<Arc<dyn OnEngineDisconnected>> {
        None
    }

    fn as_engine_failed_to_connect(self: Arc<Self>) -> Option<Arc<dyn OnEngineFailedToConnect>> {
        None
    }

    fn as_patterns_changed(self: Arc<Self>) -> Option<Arc<dyn OnPatternsChanged>> {
        None
    }

    fn as_tangible_added(self: Arc<Self>) -> Option<Arc<dyn OnTangibleAdded>> {
        None
    }

    fn as_tangible_updated(self: Arc<Self>) -> Option<Arc<dyn OnTangibleUpdated>> {
        None
    }

    fn as_tangible_removed(self: Arc<Self>) -> Option<Arc<dyn OnTangibleRemoved>> {
        None
    }
}

/// Subscribers of one capability
pub struct Publisher<C: ?Sized> {
    subscribers: RwLock<Vec<Arc<C>>>,
}

impl<C: ?Sized> Publisher<C> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Add a subscriber; returns false if it was already registered
    pub fn subscribe(&self, subscriber: Arc<C>) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| same(s, &subscriber)) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Remove a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, subscriber: &Arc<C>) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| !same(s, subscriber));
        subscribers.len() != before
    }

    pub fn contains(&self, subscriber: &Arc<C>) -> bool {
        self.subscribers.read().iter().any(|s| same(s, subscriber))
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Call `notify` for every subscriber registered when publishing began
    ///
    /// Subscribers may (un)subscribe from inside `notify`. A panicking
    /// subscriber is logged and skipped.
    pub fn publish<F>(&self, notify: F)
    where
        F: Fn(&C),
    {
        let snapshot = self.subscribers.read().clone();
        for subscriber in &snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| notify(subscriber.as_ref())));
            if let Err(payload) = result {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "Subscriber panicked"
                );
            }
        }
    }
}

impl<C: ?Sized> Default for Publisher<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of the allocation, ignoring trait-object metadata
fn same<C: ?Sized>(a: &Arc<C>, b: &Arc<C>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

macro_rules! fn_adapter {
    ($adapter:ident, $capability:ident, $method:ident $(, $arg:ident : $ty:ty)?) => {
        /// Closure adapter for delegate-style registration
        pub struct $adapter<F>(pub F);

        impl<F> $capability for $adapter<F>
        where
            F: Fn($($ty)?) + Send + Sync,
        {
            fn $method(&self $(, $arg: $ty)?) {
                (self.0)($($arg)?)
            }
        }
    };
}

fn_adapter!(FnEngineConnected, OnEngineConnected, on_engine_connected);
fn_adapter!(FnEngineDisconnected, OnEngineDisconnected, on_engine_disconnected);
fn_adapter!(FnEngineFailedToConnect, OnEngineFailedToConnect, on_engine_failed_to_connect);
fn_adapter!(FnPatternsChanged, OnPatternsChanged, on_patterns_changed, patterns: &Arc<Vec<Pattern>>);
fn_adapter!(FnTangibleAdded, OnTangibleAdded, on_tangible_added, tangible: &TangibleHandle);
fn_adapter!(FnTangibleUpdated, OnTangibleUpdated, on_tangible_updated, tangible: &TangibleHandle);
fn_adapter!(FnTangibleRemoved, OnTangibleRemoved, on_tangible_removed, tangible: &TangibleHandle);

/// Handle of a delegate-style registration
#[derive(Clone)]
pub enum Subscription {
    EngineConnected(Arc<dyn OnEngineConnected>),
    EngineDisconnected(Arc<dyn OnEngineDisconnected>),
    EngineFailedToConnect(Arc<dyn OnEngineFailedToConnect>),
    PatternsChanged(Arc<dyn OnPatternsChanged>),
    TangibleAdded(Arc<dyn OnTangibleAdded>),
    TangibleUpdated(Arc<dyn OnTangibleUpdated>),
    TangibleRemoved(Arc<dyn OnTangibleRemoved>),
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::EngineConnected(_) => "EngineConnected",
            Self::EngineDisconnected(_) => "EngineDisconnected",
            Self::EngineFailedToConnect(_) => "EngineFailedToConnect",
            Self::PatternsChanged(_) => "PatternsChanged",
            Self::TangibleAdded(_) => "TangibleAdded",
            Self::TangibleUpdated(_) => "TangibleUpdated",
            Self::TangibleRemoved(_) => "TangibleRemoved",
        };
        f.debug_tuple("Subscription").field(&kind).finish()
    }
}

/// One publisher per engine event
#[derive(Default)]
pub struct Publishers {
    pub engine_connected: Publisher<dyn OnEngineConnected>,
    pub engine_disconnected: Publisher<dyn OnEngineDisconnected>,
    pub engine_failed_to_connect: Publisher<dyn OnEngineFailedToConnect>,
    pub patterns_changed: Publisher<dyn OnPatternsChanged>,
    pub tangible_added: Publisher<dyn OnTangibleAdded>,
    pub tangible_updated: Publisher<dyn OnTangibleUpdated>,
    pub tangible_removed: Publisher<dyn OnTangibleRemoved>,
}

impl Publishers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interface-style subscriber for every capability it exposes
    ///
    /// Returns whether it implements [`OnEngineConnected`].
    pub fn subscribe<S: Subscriber + ?Sized + 'static>(&self, subscriber: &Arc<S>) -> bool {
        if let Some(s) = subscriber.clone().as_engine_disconnected() {
            self.engine_disconnected.subscribe(s);
        }
        if let Some(s) = subscriber.clone().as_engine_failed_to_connect() {
            self.engine_failed_to_connect.subscribe(s);
        }
        if let Some(s) = subscriber.clone().as_patterns_changed() {
            self.patterns_changed.subscribe(s);
        }
        if let Some(s) = subscriber.clone().as_tangible_added() {
            self.tangible_added.subscribe(s);
        }
        if let Some(s) = subscriber.clone().as_tangible_updated() {
            self.tangible_updated.subscribe(s);
        }
        if let Some(s) = subscriber.clone().as_tangible_removed() {
            self.tangible_removed.subscribe(s);
        }
        match subscriber.clone().as_engine_connected() {
            Some(s) => {
                self.engine_connected.subscribe(s);
                true
            }
            None => false,
        }
    }

    /// Remove an interface-style subscriber from every publisher
    pub fn unsubscribe<S: Subscriber + ?Sized + 'static>(&self, subscriber: &Arc<S>) {
        if let Some(s) = subscriber.clone().as_engine_connected() {
            self.engine_connected.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_engine_disconnected() {
            self.engine_disconnected.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_engine_failed_to_connect() {
            self.engine_failed_to_connect.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_patterns_changed() {
            self.patterns_changed.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_tangible_added() {
            self.tangible_added.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_tangible_updated() {
            self.tangible_updated.unsubscribe(&s);
        }
        if let Some(s) = subscriber.clone().as_tangible_removed() {
            self.tangible_removed.unsubscribe(&s);
        }
    }

    pub fn on_engine_connected<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnEngineConnected> = Arc::new(FnEngineConnected(f));
        self.engine_connected.subscribe(adapter.clone());
        Subscription::EngineConnected(adapter)
    }

    pub fn on_engine_disconnected<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnEngineDisconnected> = Arc::new(FnEngineDisconnected(f));
        self.engine_disconnected.subscribe(adapter.clone());
        Subscription::EngineDisconnected(adapter)
    }

    pub fn on_engine_failed_to_connect<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnEngineFailedToConnect> = Arc::new(FnEngineFailedToConnect(f));
        self.engine_failed_to_connect.subscribe(adapter.clone());
        Subscription::EngineFailedToConnect(adapter)
    }

    pub fn on_patterns_changed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<Vec<Pattern>>) + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnPatternsChanged> = Arc::new(FnPatternsChanged(f));
        self.patterns_changed.subscribe(adapter.clone());
        Subscription::PatternsChanged(adapter)
    }

    pub fn on_tangible_added<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnTangibleAdded> = Arc::new(FnTangibleAdded(f));
        self.tangible_added.subscribe(adapter.clone());
        Subscription::TangibleAdded(adapter)
    }

    pub fn on_tangible_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnTangibleUpdated> = Arc::new(FnTangibleUpdated(f));
        self.tangible_updated.subscribe(adapter.clone());
        Subscription::TangibleUpdated(adapter)
    }

    pub fn on_tangible_removed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TangibleHandle) + Send + Sync + 'static,
    {
        let adapter: Arc<dyn OnTangibleRemoved> = Arc::new(FnTangibleRemoved(f));
        self.tangible_removed.subscribe(adapter.clone());
        Subscription::TangibleRemoved(adapter)
    }

    /// Remove a delegate-style registration; returns false if already removed
    pub fn unsubscribe_callback(&self, subscription: &Subscription) -> bool {
        match subscription {
            Subscription::EngineConnected(s) => self.engine_connected.unsubscribe(s),
            Subscription::EngineDisconnected(s) => self.engine_disconnected.unsubscribe(s),
            Subscription::EngineFailedToConnect(s) => self.engine_failed_to_connect.unsubscribe(s),
            Subscription::PatternsChanged(s) => self.patterns_changed.unsubscribe(s),
            Subscription::TangibleAdded(s) => self.tangible_added.unsubscribe(s),
            Subscription::TangibleUpdated(s) => self.tangible_updated.unsubscribe(s),
            Subscription::TangibleRemoved(s) => self.tangible_removed.unsubscribe(s),
        }
    }

    /// Drop every subscriber
    pub fn clear(&self) {
        self.engine_connected.clear();
        self.engine_disconnected.clear();
        self.engine_failed_to_connect.clear();
        self.patterns_changed.clear();
        self.tangible_added.clear();
        self.tangible_updated.clear();
        self.tangible_removed.clear();
    }
}

/// Subscriber that records every event it sees
///
/// Useful for polling hosts and tests; [`EventRecorder::take`] drains the
/// events collected so far.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<EngineEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn record(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

impl OnEngineConnected for EventRecorder {
    fn on_engine_connected(&self) {
        self.record(EngineEvent::Connected);
    }
}

impl OnEngineDisconnected for EventRecorder {
    fn on_engine_disconnected(&self) {
        self.record(EngineEvent::Disconnected);
    }
}

impl OnEngineFailedToConnect for EventRecorder {
    fn on_engine_failed_to_connect(&self) {
        self.record(EngineEvent::FailedToConnect);
    }
}

impl OnPatternsChanged for EventRecorder {
    fn on_patterns_changed(&self, patterns: &Arc<Vec<Pattern>>) {
        self.record(EngineEvent::PatternsChanged(Arc::clone(patterns)));
    }
}

impl OnTangibleAdded for EventRecorder {
    fn on_tangible_added(&self, tangible: &TangibleHandle) {
        self.record(EngineEvent::TangibleAdded(tangible.clone()));
    }
}

impl OnTangibleUpdated for EventRecorder {
    fn on_tangible_updated(&self, tangible: &TangibleHandle) {
        self.record(EngineEvent::TangibleUpdated(tangible.clone()));
    }
}

impl OnTangibleRemoved for EventRecorder {
    fn on_tangible_removed(&self, tangible: &TangibleHandle) {
        self.record(EngineEvent::TangibleRemoved(tangible.clone()));
    }
}

impl Subscriber for EventRecorder {
    fn as_engine_connected(self: Arc<Self>) -> Option<Arc<dyn OnEngineConnected>> {
        Some(self)
    }

    fn as_engine_disconnected(self: Arc<Self>) -> Option<Arc<dyn OnEngineDisconnected>> {
        Some(self)
    }

    fn as_engine_failed_to_connect(self: Arc<Self>) -> Option<Arc<dyn OnEngineFailedToConnect>> {
        Some(self)
    }

    fn as_patterns_changed(self: Arc<Self>) -> Option<Arc<dyn OnPatternsChanged>> {
        Some(self)
    }

    fn as_tangible_added(self: Arc<Self>) -> Option<Arc<dyn OnTangibleAdded>> {
        Some(self)
    }

    fn as_tangible_updated(self: Arc<Self>) -> Option<Arc<dyn OnTangibleUpdated>> {
        Some(self)
    }

    fn as_tangible_removed(self: Arc<Self>) -> Option<Arc<dyn OnTangibleRemoved>> {
        Some(self)
    }
}
