//! Private key provisioning.
//!
//! The key lives in a PEM file owned by the host process. It is created on
//! first use and reused on every later start, so a restarted bootstrap
//! resubmits a CSR for the same public key and the CA service recognizes
//! the request it already holds.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hostenroll_core::{naming, EnrollError, Result};
use rcgen::KeyPair;
use tracing::{debug, info, warn};

use crate::KeyAlgorithm;

/// A key pair together with the exact PEM it was stored as.
pub struct PrivateKey {
    key_pair: KeyPair,
    pem: String,
}

impl PrivateKey {
    /// Generate a fresh key.
    pub fn generate(algorithm: KeyAlgorithm) -> std::result::Result<Self, rcgen::Error> {
        let key_pair = KeyPair::generate_for(algorithm.signature_algorithm())?;
        let pem = key_pair.serialize_pem();
        Ok(Self { key_pair, pem })
    }

    /// Parse a PEM-encoded PKCS#8 key.
    pub fn from_pem(pem: &str) -> std::result::Result<Self, rcgen::Error> {
        let key_pair = KeyPair::from_pem(pem)?;
        Ok(Self {
            key_pair,
            pem: pem.to_string(),
        })
    }

    /// PEM text, byte-identical to the key file.
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Raw public key bytes (the subjectPublicKey bit string contents).
    #[must_use]
    pub fn public_key_raw(&self) -> &[u8] {
        self.key_pair.public_key_raw()
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// Per-host key location inside `dir`.
pub fn key_path_for(dir: impl AsRef<Path>, host: &str) -> PathBuf {
    dir.as_ref().join(naming::key_file_name(host))
}

/// Load the key at `path`, or create and persist a new one.
///
/// An existing file that parses is returned unchanged. A missing file is
/// created without clobbering: when another process creates it first, its
/// key is loaded and returned instead of ours, so every caller ends up
/// holding the key on disk. An unparsable file is replaced. Any other read
/// error is reported instead of overwriting a file we could not inspect.
pub fn load_or_create(path: &Path, algorithm: KeyAlgorithm) -> Result<PrivateKey> {
    let replace = match fs::read_to_string(path) {
        Ok(existing) => match PrivateKey::from_pem(&existing) {
            Ok(key) => {
                debug!(path = %path.display(), "reusing existing private key");
                return Ok(key);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "private key is unparsable, regenerating");
                true
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            warn!(path = %path.display(), "private key is not valid UTF-8, regenerating");
            true
        }
        Err(e) => return Err(EnrollError::key(path, format!("cannot read: {e}"))),
    };

    let key = PrivateKey::generate(algorithm)
        .map_err(|e| EnrollError::key(path, format!("generation failed: {e}")))?;

    let created = if replace {
        write_private(path, key.pem().as_bytes()).map(|()| true)
    } else {
        create_private(path, key.pem().as_bytes())
    }
    .map_err(|e| EnrollError::key(path, format!("cannot write: {e}")))?;

    if !created {
        debug!(path = %path.display(), "private key created concurrently, loading it");
        let existing = fs::read_to_string(path)
            .map_err(|e| EnrollError::key(path, format!("cannot read: {e}")))?;
        return PrivateKey::from_pem(&existing).map_err(|e| {
            EnrollError::key(path, format!("concurrently created key is unparsable: {e}"))
        });
    }

    info!(path = %path.display(), %algorithm, "generated new private key");
    Ok(key)
}

/// Replace `path` with `contents` atomically, readable by the owner only.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk and renamed over the target, so readers see either the old file or
/// the complete new one.
pub fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    stage(path, contents)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_private`], but never replaces an existing `path`.
///
/// Returns `false`, leaving `path` untouched, when it already exists.
pub fn create_private(path: &Path, contents: &[u8]) -> io::Result<bool> {
    match stage(path, contents)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Write `contents` to a synced temporary file next to `path`.
fn stage(path: &Path, contents: &[u8]) -> io::Result<tempfile::NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    create_private_dir(dir)?;

    // NamedTempFile is created with mode 0600 on Unix.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Create `dir` and missing parents; new directories are owner-only on Unix.
fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_then_reuses() {
        let dir = TempDir::new().unwrap();
        let path = key_path_for(dir.path(), "node-1");
        assert!(path.ends_with("hostenroll-node-1.key"));

        let created = load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(created.pem(), on_disk);
        assert!(on_disk.contains("PRIVATE KEY"));

        let reloaded = load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap();
        assert_eq!(reloaded.pem(), created.pem());
        assert_eq!(reloaded.public_key_raw(), created.public_key_raw());
        assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);
    }

    #[test]
    fn test_existing_key_kept_regardless_of_algorithm() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.pem");

        let first = load_or_create(&path, KeyAlgorithm::Ed25519).unwrap();
        let second = load_or_create(&path, KeyAlgorithm::EcdsaP384).unwrap();
        assert_eq!(first.pem(), second.pem());
    }

    #[test]
    fn test_garbage_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.pem");
        fs::write(&path, "not a key").unwrap();

        let key = load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), key.pem());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("nested").join("k.pem");
        load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.pem");
        load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unwritable_location_is_key_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // Parent is a regular file, so the directory cannot be created.
        let path = blocker.join("k.pem");

        let err = load_or_create(&path, KeyAlgorithm::EcdsaP256).unwrap_err();
        assert!(matches!(err, EnrollError::Key { .. }), "{err:?}");
    }

    #[test]
    fn test_concurrent_creation_converges() {
        use std::sync::{Arc, Barrier};

        for _ in 0..10 {
            let dir = TempDir::new().unwrap();
            let path = Arc::new(key_path_for(dir.path(), "node-1"));
            let barrier = Arc::new(Barrier::new(4));

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let path = Arc::clone(&path);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        load_or_create(&path, KeyAlgorithm::EcdsaP256)
                            .unwrap()
                            .pem()
                            .to_string()
                    })
                })
                .collect();

            let pems: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let on_disk = fs::read_to_string(path.as_path()).unwrap();
            for pem in &pems {
                assert_eq!(pem, &on_disk);
            }
            let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
            assert_eq!(entries.len(), 1);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_created_directory_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        load_or_create(&state.join("k.pem"), KeyAlgorithm::EcdsaP256).unwrap();

        let mode = fs::metadata(&state).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_create_private_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.pem");
        fs::write(&path, "first").unwrap();

        assert!(!create_private(&path, b"second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_debug_hides_key() {
        let key = PrivateKey::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("PRIVATE KEY"));
    }
}
