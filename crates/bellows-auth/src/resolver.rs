//! Request identity resolution.

use base64::Engine;

use bellows_records::RecordStore;
use bellows_types::{unix_now, Repository, Token, User};

use crate::credentials::hash_token;

/// How an identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: Basic <b64>` with the password validated as a token.
    Basic,
    /// `?access_token=<token>` query parameter.
    Query,
    /// SSH public-key fingerprint.
    SshKey,
}

/// A resolved request identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The authenticated user.
    pub user: User,
    /// The method that established it.
    pub method: AuthMethod,
    /// The token row, when a token established the identity. Carries the
    /// scope list the transports enforce per repository.
    pub token: Option<Token>,
}

impl Identity {
    /// The user, unless a token scope excludes this repository.
    ///
    /// A scoped token behaves as anonymous outside its scope rather than
    /// being rejected, matching the resolver's no-error contract.
    pub fn user_for(&self, repo: &Repository) -> Option<&User> {
        match &self.token {
            Some(token) if !token.permits_repo(&repo.full_name()) => None,
            _ => Some(&self.user),
        }
    }
}

/// Resolves request credentials to an identity.
///
/// Every method returns `None` on any failure: unknown, malformed, revoked,
/// expired, or owned by a disabled user. Callers never learn which.
pub trait IdentityResolver: Send + Sync {
    /// Resolve a raw token value (bearer or query).
    fn resolve_token(&self, raw: &str) -> Option<Identity>;

    /// Resolve Basic credentials. The username is informational; the
    /// password is validated as a personal access token and the token's
    /// owner becomes the identity.
    fn resolve_basic(&self, username: &str, password: &str) -> Option<Identity>;

    /// Resolve an SSH public-key fingerprint (`SHA256:<hex>`).
    fn resolve_ssh_fingerprint(&self, fingerprint: &str) -> Option<Identity>;

    /// Resolve HTTP credentials: the `Authorization` header value, then the
    /// `?access_token=` query parameter.
    fn resolve_http(
        &self,
        authorization: Option<&str>,
        access_token: Option<&str>,
    ) -> Option<Identity> {
        if let Some(value) = authorization {
            if let Some(raw) = value.strip_prefix("Bearer ") {
                return self.resolve_token(raw.trim());
            }
            if let Some(encoded) = value.strip_prefix("Basic ") {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .ok()?;
                let decoded = String::from_utf8(decoded).ok()?;
                let (username, password) = decoded.split_once(':')?;
                return self.resolve_basic(username, password);
            }
            return None;
        }
        access_token.and_then(|raw| {
            self.resolve_token(raw).map(|mut identity| {
                identity.method = AuthMethod::Query;
                identity
            })
        })
    }
}

/// Production resolver over the record store.
#[derive(Clone)]
pub struct RecordResolver {
    records: RecordStore,
}

impl RecordResolver {
    /// Create a resolver over the given records.
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }

    fn token_identity(&self, raw: &str, method: AuthMethod) -> Option<Identity> {
        let token = self.records.tokens.get_by_hash(&hash_token(raw))?;
        if token.revoked || token.is_expired(unix_now()) {
            return None;
        }
        let user = self.records.users.get(token.user_id)?;
        if user.disabled {
            return None;
        }
        self.records.tokens.touch(token.id);
        Some(Identity {
            user,
            method,
            token: Some(token),
        })
    }
}

impl IdentityResolver for RecordResolver {
    fn resolve_token(&self, raw: &str) -> Option<Identity> {
        self.token_identity(raw, AuthMethod::Bearer)
    }

    fn resolve_basic(&self, username: &str, password: &str) -> Option<Identity> {
        let identity = self.token_identity(password, AuthMethod::Basic)?;
        if identity.user.username != username {
            tracing::debug!(
                claimed = %username,
                actual = %identity.user.username,
                "basic auth username does not match token owner"
            );
        }
        Some(identity)
    }

    fn resolve_ssh_fingerprint(&self, fingerprint: &str) -> Option<Identity> {
        let key = self.records.ssh_keys.get_by_fingerprint(fingerprint)?;
        let user = self.records.users.get(key.user_id)?;
        if user.disabled {
            return None;
        }
        Some(Identity {
            user,
            method: AuthMethod::SshKey,
            token: None,
        })
    }
}
