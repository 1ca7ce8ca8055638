//! In-memory record stores with optional write-through persistence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use bellows_types::{
    unix_now, validate_repo_name, validate_username, AuditRecord, RepoId, RepoMember, RepoRole,
    Repository, SshKey, SshKeyId, Token, TokenId, User, UserId, Visibility,
};

use crate::error::{RecordError, Result};
use crate::persist::RocksRecords;

/// The full record store.
#[derive(Clone)]
pub struct RecordStore {
    /// User rows.
    pub users: UserStore,
    /// Personal access token rows.
    pub tokens: TokenStore,
    /// SSH key rows.
    pub ssh_keys: SshKeyStore,
    /// Repository rows.
    pub repos: RepoRecordStore,
    /// Membership rows.
    pub members: MemberStore,
    persist: Option<Arc<RocksRecords>>,
    audit_next_id: Arc<AtomicU64>,
}

impl RecordStore {
    /// Create an ephemeral in-memory store.
    pub fn in_memory() -> Self {
        Self::with_persistence(None)
    }

    /// Open a store persisted at `path`, loading every row into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Arc::new(RocksRecords::open(path)?);
        let store = Self::with_persistence(Some(db.clone()));

        for user in db.load_all::<User>(crate::persist::CF_USERS)? {
            store.users.load(user);
        }
        for token in db.load_all::<Token>(crate::persist::CF_TOKENS)? {
            store.tokens.load(token);
        }
        for key in db.load_all::<SshKey>(crate::persist::CF_SSH_KEYS)? {
            store.ssh_keys.load(key);
        }
        for repo in db.load_all::<Repository>(crate::persist::CF_REPOS)? {
            store.repos.load(repo);
        }
        for member in db.load_all::<RepoMember>(crate::persist::CF_MEMBERS)? {
            store.members.load(member);
        }
        let last_audit = db.load_audit()?.last().map(|r| r.id).unwrap_or(0);
        store.audit_next_id.store(last_audit + 1, Ordering::SeqCst);

        Ok(store)
    }

    fn with_persistence(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            users: UserStore::new(persist.clone()),
            tokens: TokenStore::new(persist.clone()),
            ssh_keys: SshKeyStore::new(persist.clone()),
            repos: RepoRecordStore::new(persist.clone()),
            members: MemberStore::new(persist.clone()),
            persist,
            audit_next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Append an audit record, assigning its id.
    pub fn append_audit(&self, mut record: AuditRecord) -> Result<AuditRecord> {
        record.id = self.audit_next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(db) = &self.persist {
            db.put_audit(&record)?;
        }
        Ok(record)
    }

    /// Read persisted audit rows, oldest first. Empty without persistence.
    pub fn audit_rows(&self) -> Result<Vec<AuditRecord>> {
        match &self.persist {
            Some(db) => db.load_audit(),
            None => Ok(Vec::new()),
        }
    }
}

/// User rows with a username index.
#[derive(Clone)]
pub struct UserStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    username_index: Arc<RwLock<HashMap<String, UserId>>>,
    next_id: Arc<AtomicU64>,
    persist: Option<Arc<RocksRecords>>,
}

impl UserStore {
    fn new(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            username_index: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            persist,
        }
    }

    fn load(&self, user: User) {
        self.bump_next_id(user.id);
        self.username_index
            .write()
            .insert(user.username.clone(), user.id);
        self.users.write().insert(user.id, user);
    }

    fn bump_next_id(&self, id: u64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    /// Create a new user.
    pub fn create(&self, username: &str, email: &str) -> Result<User> {
        validate_username(username)?;

        let mut users = self.users.write();
        let mut index = self.username_index.write();
        if index.contains_key(username) {
            return Err(RecordError::UsernameExists(username.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User::new(id, username, email);
        if let Some(db) = &self.persist {
            db.put_user(&user)?;
        }
        index.insert(username.to_string(), id);
        users.insert(id, user.clone());
        Ok(user)
    }

    /// Get a user by ID.
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.read().get(&id).cloned()
    }

    /// Get a user by username.
    pub fn get_by_username(&self, username: &str) -> Option<User> {
        let id = *self.username_index.read().get(username)?;
        self.users.read().get(&id).cloned()
    }

    /// Replace a user row.
    pub fn update(&self, mut user: User) -> Result<User> {
        user.updated_at = unix_now();
        let mut users = self.users.write();
        if !users.contains_key(&user.id) {
            return Err(RecordError::UserNotFound(user.username));
        }
        if let Some(db) = &self.persist {
            db.put_user(&user)?;
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Number of users.
    pub fn count(&self) -> usize {
        self.users.read().len()
    }
}

/// Token rows with a hash index.
#[derive(Clone)]
pub struct TokenStore {
    tokens: Arc<RwLock<HashMap<TokenId, Token>>>,
    hash_index: Arc<RwLock<HashMap<String, TokenId>>>,
    next_id: Arc<AtomicU64>,
    persist: Option<Arc<RocksRecords>>,
}

impl TokenStore {
    fn new(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            hash_index: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            persist,
        }
    }

    fn load(&self, token: Token) {
        self.next_id.fetch_max(token.id + 1, Ordering::SeqCst);
        self.hash_index
            .write()
            .insert(token.token_hash.clone(), token.id);
        self.tokens.write().insert(token.id, token);
    }

    /// Store a new token row for a precomputed hash.
    pub fn issue(
        &self,
        user_id: UserId,
        name: &str,
        token_hash: &str,
        scopes: Vec<String>,
        expires_at: Option<u64>,
    ) -> Result<Token> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut token = Token::new(id, user_id, name, token_hash);
        token.scopes = scopes;
        token.expires_at = expires_at;

        if let Some(db) = &self.persist {
            db.put_token(&token)?;
        }
        self.hash_index
            .write()
            .insert(token.token_hash.clone(), id);
        self.tokens.write().insert(id, token.clone());
        Ok(token)
    }

    /// Look up a token row by its stored hash.
    pub fn get_by_hash(&self, token_hash: &str) -> Option<Token> {
        let id = *self.hash_index.read().get(token_hash)?;
        self.tokens.read().get(&id).cloned()
    }

    /// Revoke a token. Revocation is monotonic; revoking twice is a no-op.
    pub fn revoke(&self, id: TokenId) -> Result<()> {
        let mut tokens = self.tokens.write();
        let token = tokens.get_mut(&id).ok_or(RecordError::TokenNotFound)?;
        token.revoked = true;
        if let Some(db) = &self.persist {
            db.put_token(token)?;
        }
        Ok(())
    }

    /// Record a successful authentication.
    pub fn touch(&self, id: TokenId) {
        let mut tokens = self.tokens.write();
        if let Some(token) = tokens.get_mut(&id) {
            token.last_used_at = Some(unix_now());
            if let Some(db) = &self.persist {
                if let Err(e) = db.put_token(token) {
                    tracing::warn!(error = %e, "failed to persist token usage timestamp");
                }
            }
        }
    }

    /// Number of tokens.
    pub fn count(&self) -> usize {
        self.tokens.read().len()
    }
}

/// SSH key rows with a fingerprint index.
#[derive(Clone)]
pub struct SshKeyStore {
    keys: Arc<RwLock<HashMap<SshKeyId, SshKey>>>,
    fingerprint_index: Arc<RwLock<HashMap<String, SshKeyId>>>,
    next_id: Arc<AtomicU64>,
    persist: Option<Arc<RocksRecords>>,
}

impl SshKeyStore {
    fn new(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            fingerprint_index: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            persist,
        }
    }

    fn load(&self, key: SshKey) {
        self.next_id.fetch_max(key.id + 1, Ordering::SeqCst);
        self.fingerprint_index
            .write()
            .insert(key.fingerprint.clone(), key.id);
        self.keys.write().insert(key.id, key);
    }

    /// Register a key. Fingerprints are unique across all users.
    pub fn add(
        &self,
        user_id: UserId,
        title: &str,
        public_key: &str,
        fingerprint: &str,
    ) -> Result<SshKey> {
        let mut keys = self.keys.write();
        let mut index = self.fingerprint_index.write();
        if index.contains_key(fingerprint) {
            return Err(RecordError::SshKeyExists(fingerprint.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key = SshKey::new(id, user_id, title, public_key, fingerprint);
        if let Some(db) = &self.persist {
            db.put_ssh_key(&key)?;
        }
        index.insert(fingerprint.to_string(), id);
        keys.insert(id, key.clone());
        Ok(key)
    }

    /// Look up a key row by fingerprint.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<SshKey> {
        let id = *self.fingerprint_index.read().get(fingerprint)?;
        self.keys.read().get(&id).cloned()
    }

    /// Remove a key.
    pub fn remove(&self, id: SshKeyId) -> Result<()> {
        let mut keys = self.keys.write();
        if let Some(key) = keys.remove(&id) {
            self.fingerprint_index.write().remove(&key.fingerprint);
            if let Some(db) = &self.persist {
                db.delete_ssh_key(id)?;
            }
        }
        Ok(())
    }

    /// Number of keys.
    pub fn count(&self) -> usize {
        self.keys.read().len()
    }
}

/// Repository rows with an `owner/name` index.
#[derive(Clone)]
pub struct RepoRecordStore {
    repos: Arc<RwLock<HashMap<RepoId, Repository>>>,
    name_index: Arc<RwLock<HashMap<String, RepoId>>>,
    next_id: Arc<AtomicU64>,
    persist: Option<Arc<RocksRecords>>,
}

impl RepoRecordStore {
    fn new(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            repos: Arc::new(RwLock::new(HashMap::new())),
            name_index: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            persist,
        }
    }

    fn load(&self, repo: Repository) {
        self.next_id.fetch_max(repo.id + 1, Ordering::SeqCst);
        self.name_index.write().insert(repo.full_name(), repo.id);
        self.repos.write().insert(repo.id, repo);
    }

    /// Create a repository record for an owner.
    pub fn create(&self, owner: &User, name: &str, visibility: Visibility) -> Result<Repository> {
        validate_repo_name(name)?;

        let mut repos = self.repos.write();
        let mut index = self.name_index.write();
        let full_name = format!("{}/{}", owner.username, name);
        if index.contains_key(&full_name) {
            return Err(RecordError::RepoExists(full_name));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let repo = Repository::new(id, owner.id, owner.username.clone(), name, visibility);
        if let Some(db) = &self.persist {
            db.put_repo(&repo)?;
        }
        index.insert(full_name, id);
        repos.insert(id, repo.clone());
        Ok(repo)
    }

    /// Get a repository by owner username and name.
    pub fn get(&self, owner: &str, name: &str) -> Option<Repository> {
        let id = *self.name_index.read().get(&format!("{owner}/{name}"))?;
        self.repos.read().get(&id).cloned()
    }

    /// Get a repository by ID.
    pub fn get_by_id(&self, id: RepoId) -> Option<Repository> {
        self.repos.read().get(&id).cloned()
    }

    /// All repository rows.
    pub fn list(&self) -> Vec<Repository> {
        self.repos.read().values().cloned().collect()
    }

    /// Replace a repository row.
    pub fn update(&self, mut repo: Repository) -> Result<Repository> {
        repo.updated_at = unix_now();
        let mut repos = self.repos.write();
        if !repos.contains_key(&repo.id) {
            return Err(RecordError::RepoNotFound(repo.full_name()));
        }
        if let Some(db) = &self.persist {
            db.put_repo(&repo)?;
        }
        repos.insert(repo.id, repo.clone());
        Ok(repo)
    }

    /// Remove a repository row.
    pub fn remove(&self, id: RepoId) -> Result<()> {
        let mut repos = self.repos.write();
        if let Some(repo) = repos.remove(&id) {
            self.name_index.write().remove(&repo.full_name());
            if let Some(db) = &self.persist {
                db.delete_repo(id)?;
            }
        }
        Ok(())
    }

    /// Number of repositories.
    pub fn count(&self) -> usize {
        self.repos.read().len()
    }
}

/// Membership rows, unique by `(repo, user)`.
#[derive(Clone)]
pub struct MemberStore {
    members: Arc<RwLock<HashMap<(RepoId, UserId), RepoMember>>>,
    persist: Option<Arc<RocksRecords>>,
}

impl MemberStore {
    fn new(persist: Option<Arc<RocksRecords>>) -> Self {
        Self {
            members: Arc::new(RwLock::new(HashMap::new())),
            persist,
        }
    }

    fn load(&self, member: RepoMember) {
        self.members
            .write()
            .insert((member.repo_id, member.user_id), member);
    }

    /// Grant or replace a member's role.
    pub fn set(&self, repo_id: RepoId, user_id: UserId, role: RepoRole) -> Result<RepoMember> {
        let member = RepoMember::new(repo_id, user_id, role);
        if let Some(db) = &self.persist {
            db.put_member(&member)?;
        }
        self.members
            .write()
            .insert((repo_id, user_id), member.clone());
        Ok(member)
    }

    /// Role of a user in a repository, if any.
    pub fn role_of(&self, repo_id: RepoId, user_id: UserId) -> Option<RepoRole> {
        self.members
            .read()
            .get(&(repo_id, user_id))
            .map(|m| m.role)
    }

    /// Remove one membership.
    pub fn remove(&self, repo_id: RepoId, user_id: UserId) -> Result<()> {
        if self.members.write().remove(&(repo_id, user_id)).is_some() {
            if let Some(db) = &self.persist {
                db.delete_member(repo_id, user_id)?;
            }
        }
        Ok(())
    }

    /// Remove every membership of a repository (repository deletion).
    pub fn remove_repo(&self, repo_id: RepoId) -> Result<()> {
        let mut members = self.members.write();
        let stale: Vec<(RepoId, UserId)> = members
            .keys()
            .filter(|(r, _)| *r == repo_id)
            .copied()
            .collect();
        for key in stale {
            members.remove(&key);
            if let Some(db) = &self.persist {
                db.delete_member(key.0, key.1)?;
            }
        }
        Ok(())
    }

    /// Members of one repository.
    pub fn list_repo(&self, repo_id: RepoId) -> Vec<RepoMember> {
        self.members
            .read()
            .values()
            .filter(|m| m.repo_id == repo_id)
            .cloned()
            .collect()
    }
}
