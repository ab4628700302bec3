use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, comparable token identifying the user that sent an event.
///
/// The transport decides what goes in here (a Telegram user id, a test
/// string); the pipeline only compares and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Opaque token identifying the group/channel an event arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for GroupId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Row id assigned by the persistence gateway.
pub type ReceiptId = i64;

/// Raw image bytes as delivered by the transport.
#[derive(Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/jpeg")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Never dump image bytes into logs.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Profile of the user who sent a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderInfo {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        };
        f.write_str(s)
    }
}

/// Chat/group metadata recorded alongside receipts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInfo {
    pub title: Option<String>,
    pub kind: ChatKind,
}
