//! Signed, versioned encoding of conversation memory for the session cookie.
//!
//! Format: `v1.<payload>.<signature>` where the payload is base64url JSON and
//! the signature is an HMAC-SHA256 over `v1.<payload>`.

use crate::error::{JaltolError, Result};
use crate::models::Turn;
use crate::session::ConversationMemory;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_TAG: &str = "v1";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMemory {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default)]
    turns: Vec<Turn>,
}

/// Encodes and verifies stored memory blobs.
#[derive(Clone)]
pub struct MemoryCodec {
    key: Vec<u8>,
}

impl std::fmt::Debug for MemoryCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCodec").finish_non_exhaustive()
    }
}

impl MemoryCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    pub fn encode(&self, memory: &ConversationMemory) -> Result<String> {
        let stored = StoredMemory {
            version: FORMAT_VERSION,
            summary: memory.summary().map(str::to_string),
            turns: memory.turns().to_vec(),
        };
        let json =
            serde_json::to_vec(&stored).map_err(|e| JaltolError::MemorySerialization(e.to_string()))?;

        let signed = format!("{}.{}", FORMAT_TAG, URL_SAFE_NO_PAD.encode(json));
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signed.as_bytes())?.finalize().into_bytes());
        Ok(format!("{}.{}", signed, signature))
    }

    pub fn decode(&self, blob: &str) -> Result<ConversationMemory> {
        let corrupt = |reason: &str| JaltolError::MemoryDeserialization(reason.to_string());

        let (signed, signature) = blob.rsplit_once('.').ok_or_else(|| corrupt("missing signature"))?;
        let (tag, payload) = signed.split_once('.').ok_or_else(|| corrupt("missing payload"))?;
        if tag != FORMAT_TAG {
            return Err(corrupt("unsupported format"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| corrupt("signature is not base64"))?;
        self.mac(signed.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| corrupt("signature mismatch"))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| corrupt("payload is not base64"))?;
        let stored: StoredMemory = serde_json::from_slice(&json)
            .map_err(|e| JaltolError::MemoryDeserialization(e.to_string()))?;
        if stored.version != FORMAT_VERSION {
            return Err(JaltolError::MemoryDeserialization(format!(
                "unsupported memory version {}",
                stored.version
            )));
        }

        Ok(ConversationMemory::from_parts(stored.summary, stored.turns))
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| JaltolError::MemorySerialization(e.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}
