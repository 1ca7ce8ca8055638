//! Record store for the Bellows forge.
//!
//! Users, tokens, SSH keys, repositories, and memberships live in
//! in-memory stores guarded by [`parking_lot::RwLock`] with secondary
//! indexes for the lookups the transports perform on every request. When a
//! record-store DSN is configured, every mutation is written through to
//! RocksDB and the maps are reloaded from it at startup, so restarts keep
//! accounts and repositories.
//!
//! Row lifecycles other than repository create/delete are driven by the
//! external user module; the transports only read.

mod error;
mod persist;
mod store;

pub use error::{RecordError, Result};
pub use persist::RocksRecords;
pub use store::{
    MemberStore, RecordStore, RepoRecordStore, SshKeyStore, TokenStore, UserStore,
};
