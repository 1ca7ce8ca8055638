//! Host key management.

use std::path::Path;

use rand::rngs::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};

use crate::{Result, SshError};

/// Load the host key from `path`, generating and persisting an Ed25519 key
/// on first start.
pub fn load_or_generate_host_key(path: &Path) -> Result<PrivateKey> {
    if path.exists() {
        return russh_keys::load_secret_key(path, None)
            .map_err(|e| SshError::HostKey(format!("{}: {e}", path.display())));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| SshError::HostKey(e.to_string()))?;
    key.write_openssh_file(path, LineEnding::LF)
        .map_err(|e| SshError::HostKey(format!("{}: {e}", path.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    tracing::info!(path = %path.display(), "generated ssh host key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/host_ed25519");

        let generated = load_or_generate_host_key(&path).unwrap();
        assert!(path.is_file());

        let reloaded = load_or_generate_host_key(&path).unwrap();
        assert_eq!(
            generated.public_key().to_openssh().unwrap(),
            reloaded.public_key().to_openssh().unwrap()
        );
    }
}
