//! SSH public key rows.

use serde::{Deserialize, Serialize};

use crate::{unix_now, SshKeyId, UserId};

/// An SSH public key registered for a user.
///
/// The fingerprint is `SHA256:` followed by the lowercase hex digest of the
/// key's wire encoding, and is unique across all keys. Lookup by
/// fingerprint yields the owning user during SSH authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    /// Unique key ID.
    pub id: SshKeyId,
    /// Owning user.
    pub user_id: UserId,
    /// User-provided title.
    pub title: String,
    /// Raw authorized-keys line as submitted.
    pub public_key: String,
    /// `SHA256:<hex>` fingerprint of the key blob.
    pub fingerprint: String,
    /// Unix timestamp when added.
    pub created_at: u64,
    /// Last time the key authenticated a session.
    pub last_used_at: Option<u64>,
}

impl SshKey {
    /// Create a new key row. The fingerprint is computed by the caller so
    /// this type stays free of crypto dependencies.
    pub fn new(
        id: SshKeyId,
        user_id: UserId,
        title: impl Into<String>,
        public_key: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            public_key: public_key.into(),
            fingerprint: fingerprint.into(),
            created_at: unix_now(),
            last_used_at: None,
        }
    }
}
