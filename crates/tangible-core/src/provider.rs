//! Tangible provider abstraction
//!
//! A [`Provider`] is a source of tangible snapshots: the live protocol
//! client talking to the recognition service, or the offline simulator.
//! Providers report what happens through a [`ProviderSink`], which the
//! engine implements. Sink methods may be called from any thread.

use crate::pattern::{Pattern, Pointer};
use crate::tangible::Tangible;

/// Receiver of provider notifications
pub trait ProviderSink: Send + Sync {
    /// The provider is connected to its source
    fn connected(&self);

    /// An established connection went away
    fn disconnected(&self);

    /// A connection attempt failed
    fn failed_to_connect(&self);

    /// A complete snapshot of the tangibles currently recognized
    fn tangibles_updated(&self, tangibles: Vec<Tangible>);

    /// The full pattern set, replacing any previous one
    fn patterns_updated(&self, patterns: Vec<Pattern>);
}

/// Source of tangible snapshots
///
/// All methods take `&self`; implementations synchronize internally so a
/// provider can be driven from the owner thread while its transport thread
/// is delivering data.
pub trait Provider: Send + Sync {
    /// Connect to the source and begin reporting
    fn start_provider(&self);

    /// Replace the pattern set held by the source
    fn set_patterns(&self, patterns: Vec<Pattern>);

    /// Ask the source to report its current pattern set
    fn request_patterns(&self);

    /// Forward the latest pointer samples
    fn update_pointers(&self, pointers: Vec<Pointer>);

    /// Disconnect and release resources. Safe to call more than once.
    fn dispose(&self);
}
