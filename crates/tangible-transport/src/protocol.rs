//! Wire protocol for the recognition service
//!
//! Every frame carries one UTF-8 JSON [`Envelope`]:
//!
//! ```text
//! {"TYPE":3,"TANGIBLES":[{"Id":1,"PatternId":7,"R":0.5,"X":10,"Y":20}],"STATUS":true,"ID":42}
//! ```
//!
//! | key          | meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `TYPE`       | message kind, 0=none 1=init 2=patterns 3=update 4=error |
//! | `PATTERNS`   | pattern array, optional                              |
//! | `TANGIBLES`  | tangible array, optional                             |
//! | `POINTERS`   | pointer array, optional                              |
//! | `STATUS`     | success flag, defaults to true                       |
//! | `DEBUG_TEXT` | human-readable diagnostic, optional                  |
//! | `ID`         | sender-assigned monotonic message id                 |

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use tangible_core::{Pattern, Pointer, ProtocolError, Tangible};

/// Kind of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageKind {
    /// Keep-alive / no-op
    #[default]
    None = 0,
    Init = 1,
    /// Pattern set request or report
    Patterns = 2,
    /// Pointer push or tangible snapshot
    Update = 3,
    Error = 4,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Init),
            2 => Ok(Self::Patterns),
            3 => Ok(Self::Update),
            4 => Ok(Self::Error),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Init => write!(f, "Init"),
            Self::Patterns => write!(f, "Patterns"),
            Self::Update => write!(f, "Update"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One message exchanged with the recognition service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "TYPE")]
    pub kind: MessageKind,

    #[serde(rename = "PATTERNS", skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<Pattern>>,

    #[serde(rename = "TANGIBLES", skip_serializing_if = "Option::is_none")]
    pub tangibles: Option<Vec<Tangible>>,

    #[serde(rename = "POINTERS", skip_serializing_if = "Option::is_none")]
    pub pointers: Option<Vec<Pointer>>,

    #[serde(rename = "STATUS")]
    pub status: bool,

    #[serde(rename = "DEBUG_TEXT", skip_serializing_if = "Option::is_none")]
    pub debug_text: Option<String>,

    #[serde(rename = "ID")]
    pub id: u32,
}

/// Envelope as it appears on the wire, before `TYPE` is validated
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "TYPE", default)]
    kind: i64,
    #[serde(rename = "PATTERNS", default)]
    patterns: Option<Vec<Pattern>>,
    #[serde(rename = "TANGIBLES", default)]
    tangibles: Option<Vec<Tangible>>,
    #[serde(rename = "POINTERS", default)]
    pointers: Option<Vec<Pointer>>,
    #[serde(rename = "STATUS", default = "default_status")]
    status: bool,
    #[serde(rename = "DEBUG_TEXT", default)]
    debug_text: Option<String>,
    #[serde(rename = "ID", default)]
    id: u32,
}

fn default_status() -> bool {
    true
}

/// Outcome of decoding an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeResult {
    Decoded(Envelope),
    /// `TYPE` was an integer outside the known kinds
    InvalidType(i64),
    /// Not UTF-8, not JSON, or not shaped like an envelope
    MalformedData(String),
}

impl DecodeResult {
    pub fn is_decoded(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }

    pub fn into_result(self) -> Result<Envelope, ProtocolError> {
        match self {
            Self::Decoded(envelope) => Ok(envelope),
            Self::InvalidType(kind) => Err(ProtocolError::InvalidMessageType(kind)),
            Self::MalformedData(reason) => Err(ProtocolError::MalformedData(reason)),
        }
    }
}

impl Envelope {
    /// An empty, successful envelope of the given kind
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            patterns: None,
            tangibles: None,
            pointers: None,
            status: true,
            debug_text: None,
            id: 0,
        }
    }

    /// Keep-alive probe
    pub fn ping() -> Self {
        Self::new(MessageKind::None)
    }

    pub fn with_patterns(mut self, patterns: Vec<Pattern>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn with_tangibles(mut self, tangibles: Vec<Tangible>) -> Self {
        self.tangibles = Some(tangibles);
        self
    }

    pub fn with_pointers(mut self, pointers: Vec<Pointer>) -> Self {
        self.pointers = Some(pointers);
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Mark the envelope as a failure report
    pub fn with_failure(mut self, debug_text: impl Into<String>) -> Self {
        self.status = false;
        self.debug_text = Some(debug_text.into());
        self
    }

    /// Canonical JSON text of this envelope
    pub fn serialize(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode an envelope, classifying every failure instead of erroring
    pub fn try_deserialize(raw: &[u8]) -> DecodeResult {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => return DecodeResult::MalformedData(format!("invalid UTF-8: {}", e)),
        };

        let raw: RawEnvelope = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => return DecodeResult::MalformedData(e.to_string()),
        };

        let kind = match MessageKind::try_from(raw.kind) {
            Ok(kind) => kind,
            Err(_) => return DecodeResult::InvalidType(raw.kind),
        };

        DecodeResult::Decoded(Envelope {
            kind,
            patterns: raw.patterns,
            tangibles: raw.tangibles,
            pointers: raw.pointers,
            status: raw.status,
            debug_text: raw.debug_text,
            id: raw.id,
        })
    }
}
