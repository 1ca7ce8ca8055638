//! Append-only audit records.

use serde::{Deserialize, Serialize};

use crate::{unix_now, RepoId, UserId};

/// Action tag attached to every audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Smart-HTTP fetch/clone served.
    HttpUploadPack,
    /// Smart-HTTP push served.
    HttpReceivePack,
    /// Smart-HTTP fetch cancelled before the child finished.
    HttpUploadPackCancelled,
    /// Smart-HTTP push cancelled before the child finished.
    HttpReceivePackCancelled,
    /// SSH fetch/clone served.
    SshUploadPack,
    /// SSH push served.
    SshReceivePack,
    /// LFS batch negotiation answered.
    LfsBatch,
    /// LFS object streamed to a client.
    LfsDownload,
    /// LFS object accepted from a client.
    LfsUpload,
    /// Repository created through the API boundary.
    RepoCreated,
    /// Repository deleted through the API boundary.
    RepoDeleted,
}

impl AuditAction {
    /// Stable string form, matching the serde encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpUploadPack => "http_upload_pack",
            Self::HttpReceivePack => "http_receive_pack",
            Self::HttpUploadPackCancelled => "http_upload_pack_cancelled",
            Self::HttpReceivePackCancelled => "http_receive_pack_cancelled",
            Self::SshUploadPack => "ssh_upload_pack",
            Self::SshReceivePack => "ssh_receive_pack",
            Self::LfsBatch => "lfs_batch",
            Self::LfsDownload => "lfs_download",
            Self::LfsUpload => "lfs_upload",
            Self::RepoCreated => "repo_created",
            Self::RepoDeleted => "repo_deleted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended audit record. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record ID, assigned by the sink.
    pub id: u64,
    /// Acting user, if the operation was authenticated.
    pub actor_id: Option<UserId>,
    /// What happened.
    pub action: AuditAction,
    /// Repository the action touched, when known.
    pub repo_id: Option<RepoId>,
    /// Client IP as observed by the transport.
    pub ip: Option<String>,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// Unix timestamp of the append.
    pub timestamp: u64,
}

impl AuditRecord {
    /// Create a record with the current timestamp; the sink assigns the id.
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: 0,
            actor_id: None,
            action,
            repo_id: None,
            ip: None,
            metadata: serde_json::Value::Null,
            timestamp: unix_now(),
        }
    }

    /// Attach the acting user.
    pub fn actor(mut self, actor_id: Option<UserId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    /// Attach the repository.
    pub fn repo(mut self, repo_id: RepoId) -> Self {
        self.repo_id = Some(repo_id);
        self
    }

    /// Attach the client IP.
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attach metadata.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_string_matches_serde_encoding() {
        let json = serde_json::to_string(&AuditAction::HttpReceivePack).unwrap();
        assert_eq!(json, format!("\"{}\"", AuditAction::HttpReceivePack));
    }

    #[test]
    fn builder_fills_optional_fields() {
        let record = AuditRecord::new(AuditAction::LfsUpload)
            .actor(Some(4))
            .repo(9)
            .ip("10.0.0.1")
            .metadata(serde_json::json!({"oid": "ff"}));
        assert_eq!(record.actor_id, Some(4));
        assert_eq!(record.repo_id, Some(9));
        assert_eq!(record.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.metadata["oid"], "ff");
    }
}
