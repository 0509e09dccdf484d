//! # Tangible Core
//!
//! Core types, traits, and errors for the tangible runtime.
//!
//! This crate provides the vocabulary shared by the transport and
//! synchronization crates, so the same engine logic can run against the
//! live recognition service, the offline simulator, or in-memory mocks.
//!
//! ## Key Traits
//!
//! - [`Channel`]: An open duplex byte channel to the recognition service
//! - [`Connector`]: Opens fresh channels, used for (re)connection
//! - [`Provider`]: A source of tangible snapshots (service or simulator)
//! - [`ProviderSink`]: Receiver of provider notifications (the engine)
//!
//! ## Key Types
//!
//! - [`Tangible`]: A recognized object as reported in one snapshot
//! - [`TangibleHandle`]: The live, identity-preserving record of a tangible
//! - [`Pattern`] / [`PatternSet`]: Templates of recognizable objects
//! - [`Pointer`]: A raw input contact point
//! - [`EngineEvent`]: Events published to application subscribers

pub mod channel;
pub mod error;
pub mod event;
pub mod mock_channel;
pub mod pattern;
pub mod profile;
pub mod provider;
pub mod tangible;

// Re-export main types
pub use channel::*;
pub use error::*;
pub use event::*;
pub use mock_channel::*;
pub use pattern::*;
pub use profile::*;
pub use provider::*;
pub use tangible::*;
