//! Signature verification against a minisign keyring
//!
//! When a keyring is configured, every downloaded dependency archive must
//! carry a valid detached signature. A failed or missing signature is fatal,
//! never skipped.

use minisign::{PublicKey, PublicKeyBox, SignatureBox};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};

/// A loaded minisign public key
#[derive(Debug)]
pub struct Keyring {
    public_key: PublicKey,
    path: PathBuf,
}

impl Keyring {
    /// Load a public key from a keyring file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| RepoError::KeyringUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let pk_box =
            PublicKeyBox::from_string(&content).map_err(|e| RepoError::KeyringUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let public_key = pk_box
            .into_public_key()
            .map_err(|e| RepoError::KeyringUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            public_key,
            path: path.to_path_buf(),
        })
    }

    /// Keyring file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify a detached signature over archive bytes
    pub fn verify(&self, name: &str, data: &[u8], signature: &str) -> Result<()> {
        let sig_box =
            SignatureBox::from_string(signature).map_err(|e| RepoError::SignatureRejected {
                name: name.to_string(),
                reason: format!("unparseable signature: {}", e),
            })?;

        let mut cursor = Cursor::new(data);
        minisign::verify(&self.public_key, &sig_box, &mut cursor, true, false, false).map_err(
            |e| RepoError::SignatureRejected {
                name: name.to_string(),
                reason: e.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minisign::KeyPair;

    fn keypair() -> KeyPair {
        KeyPair::generate_unencrypted_keypair().expect("generate keypair")
    }

    fn write_keyring(dir: &Path, kp: &KeyPair) -> PathBuf {
        let path = dir.join("capstan.pub");
        std::fs::write(&path, kp.pk.to_box().unwrap().to_string()).unwrap();
        path
    }

    fn sign(kp: &KeyPair, data: &[u8]) -> String {
        let mut cursor = Cursor::new(data);
        minisign::sign(None, &kp.sk, &mut cursor, None, None)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let kp = keypair();
        let keyring = Keyring::load(&write_keyring(dir.path(), &kp)).unwrap();

        let data = b"archive bytes";
        let signature = sign(&kp, data);

        keyring.verify("redis", data, &signature).unwrap();
    }

    #[test]
    fn test_tampered_data_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kp = keypair();
        let keyring = Keyring::load(&write_keyring(dir.path(), &kp)).unwrap();

        let signature = sign(&kp, b"archive bytes");
        let err = keyring
            .verify("redis", b"other bytes", &signature)
            .unwrap_err();
        assert!(matches!(err, RepoError::SignatureRejected { .. }));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let signer = keypair();
        let other = keypair();
        let keyring = Keyring::load(&write_keyring(dir.path(), &other)).unwrap();

        let data = b"archive bytes";
        let signature = sign(&signer, data);

        assert!(keyring.verify("redis", data, &signature).is_err());
    }

    #[test]
    fn test_missing_keyring_file() {
        let err = Keyring::load(Path::new("/nonexistent/capstan.pub")).unwrap_err();
        assert!(matches!(err, RepoError::KeyringUnreadable { .. }));
    }
}
