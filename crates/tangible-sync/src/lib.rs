//! # Tangible Sync
//!
//! The client-side tangible engine: keeps a live model of the tangibles a
//! provider recognizes and tells the application what changed.
//!
//! This crate sits on top of the provider vocabulary from `tangible-core`
//! and the protocol client from `tangible-transport`.
//!
//! ## Key Components
//!
//! - [`TangibleEngine`]: Snapshot reconciliation and the public API
//! - [`Dispatcher`]: Marshals provider notifications onto the owner thread
//! - [`Publishers`]: Interface-style and callback-style subscriptions
//! - [`SimulatorProvider`]: Offline provider driven by the host
//! - [`EngineConfig`]: TOML-loadable engine settings
//!
//! ## Snapshot Semantics
//!
//! Every provider report is a complete picture of the surface. On each
//! tick the engine diffs the latest report against its live records:
//!
//! 1. **Added**: ids not seen before get a new record, bound to its pattern.
//! 2. **Updated**: known ids are updated in place, so handles held by the
//!    application see the new position without re-lookup.
//! 3. **Removed**: live ids missing from the report are dropped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tangible_sync::{EngineConfig, TangibleEngine};
//!
//! let engine = TangibleEngine::from_config(&EngineConfig::simulator(), runtime.handle().clone())?;
//! engine.on_tangible_added(|t| println!("placed {}", t.id()));
//! engine.init();
//!
//! loop {
//!     engine.update_pointers(read_touches());
//!     engine.tick();
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod publisher;
pub mod simulator;

// Re-exports
pub use config::{EngineConfig, ProviderMode};
pub use dispatcher::{DispatchErrorHandler, Dispatcher};
pub use engine::{ProviderBackend, TangibleEngine};
pub use publisher::{
    EventRecorder, OnEngineConnected, OnEngineDisconnected, OnEngineFailedToConnect,
    OnPatternsChanged, OnTangibleAdded, OnTangibleRemoved, OnTangibleUpdated, Publisher,
    Publishers, Subscriber, Subscription,
};
pub use simulator::{SIMULATED_POINTER_IDS, SimulatorProvider};
