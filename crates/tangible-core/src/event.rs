//! Engine events

use std::fmt;
use std::sync::Arc;

use crate::pattern::Pattern;
use crate::tangible::TangibleHandle;

/// Everything the engine tells its subscribers about
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The provider connected to its source
    Connected,

    /// The provider lost its connection
    Disconnected,

    /// A connection attempt failed
    FailedToConnect,

    /// The active pattern set was replaced
    PatternsChanged(Arc<Vec<Pattern>>),

    /// A tangible appeared
    TangibleAdded(TangibleHandle),

    /// A live tangible moved or rotated
    TangibleUpdated(TangibleHandle),

    /// A tangible left the surface
    TangibleRemoved(TangibleHandle),
}

impl EngineEvent {
    /// Short name for logging
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::FailedToConnect => EventKind::FailedToConnect,
            Self::PatternsChanged(_) => EventKind::PatternsChanged,
            Self::TangibleAdded(_) => EventKind::TangibleAdded,
            Self::TangibleUpdated(_) => EventKind::TangibleUpdated,
            Self::TangibleRemoved(_) => EventKind::TangibleRemoved,
        }
    }

    /// The tangible this event is about, if any
    pub fn tangible(&self) -> Option<&TangibleHandle> {
        match self {
            Self::TangibleAdded(t) | Self::TangibleUpdated(t) | Self::TangibleRemoved(t) => Some(t),
            _ => None,
        }
    }
}

/// Discriminant of an [`EngineEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    FailedToConnect,
    PatternsChanged,
    TangibleAdded,
    TangibleUpdated,
    TangibleRemoved,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "engine connected"),
            Self::Disconnected => write!(f, "engine disconnected"),
            Self::FailedToConnect => write!(f, "engine failed to connect"),
            Self::PatternsChanged => write!(f, "patterns changed"),
            Self::TangibleAdded => write!(f, "tangible added"),
            Self::TangibleUpdated => write!(f, "tangible updated"),
            Self::TangibleRemoved => write!(f, "tangible removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tangible::Tangible;

    #[test]
    fn test_event_kind_and_tangible() {
        let handle = TangibleHandle::new(Tangible::new(1, 2), None);

        let added = EngineEvent::TangibleAdded(handle.clone());
        assert_eq!(added.kind(), EventKind::TangibleAdded);
        assert_eq!(added.tangible().map(|t| t.id()), Some(1));

        assert!(EngineEvent::Connected.tangible().is_none());
        assert_eq!(EventKind::Disconnected.to_string(), "engine disconnected");
    }
}
