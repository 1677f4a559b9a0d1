use serde::Deserialize;

/// Payload of a media attachment: either raw bytes delivered inline
/// (base64-encoded on the wire) or a URL the bytes can be fetched from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaData {
    Url(String),
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A media attachment carried by an incoming message.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaAttachment {
    pub data: MediaData,
    /// MIME type as reported by the protocol layer; detected from the bytes
    /// when absent.
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// One message observed on the live stream.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub sender_name: String,
    pub sender_address: String,
    pub chat_location: String,
    /// Origin timestamp, seconds since epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
    #[serde(default)]
    pub view_once: bool,
}

/// Partial view of a message as carried by a revoke event. The "after" view
/// is always present but may be stripped of content; the "before" view
/// exists only while the protocol layer still held the original.
#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub chat_location: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_address: Option<String>,
    /// Original send time, seconds since epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub body: Option<String>,
}

/// A "deleted for everyone" protocol event.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeEvent {
    pub after: Reference,
    #[serde(default)]
    pub before: Option<Reference>,
}

impl RevokeEvent {
    /// Id under which reconciliation resolves: the before-view when the
    /// protocol layer still held it, the stripped after-view otherwise.
    pub fn target_id(&self) -> &str {
        self.before
            .as_ref()
            .map_or(self.after.id.as_str(), |before| before.id.as_str())
    }
}

/// Host-level event feed, one JSON object per line on stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Message(IncomingMessage),
    Revoke(RevokeEvent),
    Ready,
}
