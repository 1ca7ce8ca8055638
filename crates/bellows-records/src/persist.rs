//! RocksDB write-through persistence for record rows.
//!
//! Rows are serialized as JSON into one column family per record kind,
//! keyed by big-endian id so iteration order matches insertion order.
//! Secondary indexes are not persisted; the in-memory store rebuilds them
//! when it loads the rows at startup.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use bellows_types::{AuditRecord, RepoId, RepoMember, Repository, SshKey, Token, User, UserId};

use crate::error::{RecordError, Result};

/// Column family names.
pub(crate) const CF_USERS: &str = "users";
pub(crate) const CF_TOKENS: &str = "tokens";
pub(crate) const CF_SSH_KEYS: &str = "ssh_keys";
pub(crate) const CF_REPOS: &str = "repos";
pub(crate) const CF_MEMBERS: &str = "members";
pub(crate) const CF_AUDIT: &str = "audit";

/// RocksDB-backed persistence for the record store.
pub struct RocksRecords {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksRecords {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_opts = opts.clone();
        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_USERS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_TOKENS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_SSH_KEYS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_REPOS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_MEMBERS, cf_opts.clone()),
            ColumnFamilyDescriptor::new(CF_AUDIT, cf_opts),
        ];

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| RecordError::Persistence(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RecordError::Persistence(format!("missing column family: {name}")))
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let encoded =
            serde_json::to_vec(value).map_err(|e| RecordError::Persistence(e.to_string()))?;
        self.db
            .put_cf(&cf, key, encoded)
            .map_err(|e| RecordError::Persistence(e.to_string()))
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| RecordError::Persistence(e.to_string()))
    }

    /// Loads every row of one column family.
    pub(crate) fn load_all<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = entry.map_err(|e| RecordError::Persistence(e.to_string()))?;
            let row = serde_json::from_slice(&value)
                .map_err(|e| RecordError::Persistence(e.to_string()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    pub(crate) fn put_user(&self, user: &User) -> Result<()> {
        self.put(CF_USERS, &user.id.to_be_bytes(), user)
    }

    pub(crate) fn put_token(&self, token: &Token) -> Result<()> {
        self.put(CF_TOKENS, &token.id.to_be_bytes(), token)
    }

    pub(crate) fn put_ssh_key(&self, key: &SshKey) -> Result<()> {
        self.put(CF_SSH_KEYS, &key.id.to_be_bytes(), key)
    }

    pub(crate) fn delete_ssh_key(&self, id: u64) -> Result<()> {
        self.delete(CF_SSH_KEYS, &id.to_be_bytes())
    }

    pub(crate) fn put_repo(&self, repo: &Repository) -> Result<()> {
        self.put(CF_REPOS, &repo.id.to_be_bytes(), repo)
    }

    pub(crate) fn delete_repo(&self, id: RepoId) -> Result<()> {
        self.delete(CF_REPOS, &id.to_be_bytes())
    }

    pub(crate) fn put_member(&self, member: &RepoMember) -> Result<()> {
        self.put(CF_MEMBERS, &member_key(member.repo_id, member.user_id), member)
    }

    pub(crate) fn delete_member(&self, repo_id: RepoId, user_id: UserId) -> Result<()> {
        self.delete(CF_MEMBERS, &member_key(repo_id, user_id))
    }

    /// Appends an audit record. Records are keyed by id and never rewritten.
    pub fn put_audit(&self, record: &AuditRecord) -> Result<()> {
        self.put(CF_AUDIT, &record.id.to_be_bytes(), record)
    }

    /// Loads every audit row, oldest first.
    pub fn load_audit(&self) -> Result<Vec<AuditRecord>> {
        self.load_all(CF_AUDIT)
    }
}

fn member_key(repo_id: RepoId, user_id: UserId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&repo_id.to_be_bytes());
    key[8..].copy_from_slice(&user_id.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = RocksRecords::open(dir.path()).unwrap();
            db.put_user(&User::new(1, "alice", "alice@example.com"))
                .unwrap();
            db.put_user(&User::new(2, "bob", "bob@example.com")).unwrap();
        }
        let db = RocksRecords::open(dir.path()).unwrap();
        let users: Vec<User> = db.load_all(CF_USERS).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[1].username, "bob");
    }

    #[test]
    fn member_keys_are_disjoint_per_pair() {
        assert_ne!(member_key(1, 2), member_key(2, 1));
        assert_ne!(member_key(1, 2), member_key(1, 3));
    }
}
