use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Raw encoded media bytes plus their encoding tag. Payloads travel to the
/// webview and into the persisted history, so the bytes serialize as base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaPayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub description: Option<String>,
    #[serde(default)]
    pub points: Vec<String>,
}

/// One captured unit: the raw payload, a renderable payload (equal to the raw
/// one for photos, a poster frame for clips), and the analysis once the remote
/// round-trip has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    pub kind: MediaKind,
    pub payload: MediaPayload,
    pub display_payload: MediaPayload,
    pub created_at: DateTime<Utc>,
    pub analysis: Option<AnalysisResult>,
}

impl MediaAsset {
    pub fn new(kind: MediaKind, payload: MediaPayload, display_payload: MediaPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            display_payload,
            created_at: Utc::now(),
            analysis: None,
        }
    }

    pub fn photo(payload: MediaPayload) -> Self {
        let display = payload.clone();
        Self::new(MediaKind::Image, payload, display)
    }

    pub fn clip(payload: MediaPayload, poster: MediaPayload) -> Self {
        Self::new(MediaKind::Video, payload, poster)
    }
}

/// Serde adapter storing binary payloads as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
