use serde_json::Value;
use sha2::{Digest, Sha256};

/// Key under which an admission is deduplicated.
///
/// An explicit caller key wins; otherwise the content fingerprint is used.
/// The two namespaces are prefixed so a caller key can never collide with a
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdempotencyKey {
    Explicit(String),
    Fingerprint(String),
}

impl IdempotencyKey {
    /// Stored representation of the key.
    pub fn as_storage_key(&self) -> String {
        match self {
            IdempotencyKey::Explicit(key) => format!("key:{key}"),
            IdempotencyKey::Fingerprint(hash) => format!("fp:{hash}"),
        }
    }
}

/// Hex SHA-256 over the identity-relevant fields of a submission.
///
/// `serde_json::Map` keeps keys sorted, so equal payloads serialize to equal
/// bytes regardless of the order the caller sent them in.
pub fn fingerprint(job_type: &str, payload: &Value, dedup_key: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    if let Some(key) = dedup_key {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
    }
    hex::encode(hasher.finalize())
}
