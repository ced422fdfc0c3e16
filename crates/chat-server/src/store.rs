//! Persistent user credential store: username → password hash, persisted as
//! a single length-prefixed blob with atomic rename-based writes.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chat_crypto::password::{self, PasswordHash, PasswordParams};

use crate::error::StoreError;

const STORE_VERSION: u8 = 1;

/// A persisted user credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique username, 1..64 UTF-8 bytes.
    pub username: String,
    /// Argon2id-hashed password plus salt and cost parameters.
    pub pwd_hash: PasswordHash,
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

fn read_bytes(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, StoreError> {
    if buf.len() < *pos + 4 {
        return Err(StoreError::StoreCorrupt("truncated length prefix".into()));
    }
    let len = u32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]) as usize;
    *pos += 4;
    if buf.len() < *pos + len {
        return Err(StoreError::StoreCorrupt("truncated field".into()));
    }
    let out = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(out)
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String, StoreError> {
    let bytes = read_bytes(buf, pos)?;
    String::from_utf8(bytes).map_err(|_| StoreError::StoreCorrupt("invalid utf-8 username".into()))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, StoreError> {
    if buf.len() < *pos + 4 {
        return Err(StoreError::StoreCorrupt("truncated u32".into()));
    }
    let v = u32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn encode_records(records: &HashMap<String, UserRecord>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(STORE_VERSION);
    buf.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for record in records.values() {
        write_string(&mut buf, &record.username);
        write_bytes(&mut buf, &record.pwd_hash.salt);
        write_bytes(&mut buf, &record.pwd_hash.hash);
        buf.extend_from_slice(&record.pwd_hash.params.memory_cost_kib.to_be_bytes());
        buf.extend_from_slice(&record.pwd_hash.params.iterations.to_be_bytes());
        buf.extend_from_slice(&record.pwd_hash.params.parallelism.to_be_bytes());
    }
    buf
}

fn decode_records(data: &[u8]) -> Result<HashMap<String, UserRecord>, StoreError> {
    if data.is_empty() {
        return Ok(HashMap::new());
    }
    if data[0] != STORE_VERSION {
        return Err(StoreError::StoreCorrupt(format!(
            "unknown store version byte 0x{:02X}",
            data[0]
        )));
    }
    let mut pos = 1;
    let count = read_u32(data, &mut pos)?;
    let mut records = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let username = read_string(data, &mut pos)?;
        let salt_bytes = read_bytes(data, &mut pos)?;
        let hash_bytes = read_bytes(data, &mut pos)?;
        let memory_cost_kib = read_u32(data, &mut pos)?;
        let iterations = read_u32(data, &mut pos)?;
        let parallelism = read_u32(data, &mut pos)?;

        let salt: [u8; 16] = salt_bytes
            .try_into()
            .map_err(|_| StoreError::StoreCorrupt("salt has wrong length".into()))?;
        let hash: [u8; 32] = hash_bytes
            .try_into()
            .map_err(|_| StoreError::StoreCorrupt("hash has wrong length".into()))?;

        records.insert(
            username.clone(),
            UserRecord {
                username,
                pwd_hash: PasswordHash {
                    salt,
                    hash,
                    params: PasswordParams {
                        memory_cost_kib,
                        iterations,
                        parallelism,
                    },
                },
            },
        );
    }
    Ok(records)
}

/// The server's user credential store: an in-memory map persisted to disk
/// via atomic temp-file-plus-rename writes. Reads on startup tolerate a
/// missing file (empty store); a corrupt file fails with
/// [`StoreError::StoreCorrupt`].
pub struct UserStore {
    path: PathBuf,
    password_params: PasswordParams,
    records: RwLock<HashMap<String, UserRecord>>,
}

impl UserStore {
    /// Open (or initialize) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreCorrupt`] if the file exists but cannot be
    /// parsed, and [`StoreError::StoreIoError`] on other I/O failure.
    pub fn open(path: impl Into<PathBuf>, password_params: PasswordParams) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(data) => decode_records(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::StoreIoError(e)),
        };
        Ok(Self {
            path,
            password_params,
            records: RwLock::new(records),
        })
    }

    /// Register a new user with a freshly Argon2id-hashed password.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserExists`] if `username` is already taken.
    pub fn register(&self, username: &str, password: &str) -> Result<(), StoreError> {
        {
            let records = self.records.read().expect("store lock poisoned");
            if records.contains_key(username) {
                return Err(StoreError::UserExists);
            }
        }

        let pwd_hash = password::hash_password(password.as_bytes(), self.password_params)?;
        let blob = {
            let mut records = self.records.write().expect("store lock poisoned");
            if records.contains_key(username) {
                return Err(StoreError::UserExists);
            }
            records.insert(
                username.to_owned(),
                UserRecord {
                    username: username.to_owned(),
                    pwd_hash,
                },
            );
            encode_records(&records)
        };
        self.persist(&blob)
    }

    /// Verify a candidate password against the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CredentialInvalid`] if the user is unknown or
    /// the password doesn't match.
    pub fn verify(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let records = self.records.read().expect("store lock poisoned");
        let record = records
            .get(username)
            .ok_or(StoreError::CredentialInvalid)?;
        if password::verify_password(password.as_bytes(), &record.pwd_hash)? {
            Ok(())
        } else {
            Err(StoreError::CredentialInvalid)
        }
    }

    /// Change `username`'s password, requiring the old password to verify
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CredentialInvalid`] if `old` does not verify.
    pub fn change_password(&self, username: &str, old: &str, new: &str) -> Result<(), StoreError> {
        self.verify(username, old)?;
        let new_hash = password::hash_password(new.as_bytes(), self.password_params)?;

        let blob = {
            let mut records = self.records.write().expect("store lock poisoned");
            // Re-verify under the write lock: a concurrent change_password
            // racing us must not clobber a newer password with a stale one.
            let record = records
                .get(username)
                .ok_or(StoreError::CredentialInvalid)?;
            if !password::verify_password(old.as_bytes(), &record.pwd_hash)? {
                return Err(StoreError::CredentialInvalid);
            }
            records.get_mut(username).expect("checked above").pwd_hash = new_hash;
            encode_records(&records)
        };
        self.persist(&blob)
    }

    /// Whether `username` has a registered record, regardless of whether
    /// they are currently online.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.records
            .read()
            .expect("store lock poisoned")
            .contains_key(username)
    }

    /// Every registered username, in no particular order.
    #[must_use]
    pub fn all_usernames(&self) -> Vec<String> {
        self.records
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn persist(&self, blob: &[u8]) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(blob)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::StoreIoError(e.error))?;

        tracing::debug!(path = %self.path.display(), bytes = blob.len(), "user store persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn params() -> PasswordParams {
        PasswordParams::low_cost_for_tests()
    }

    #[test]
    fn register_then_verify() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.bin"), params()).unwrap();

        store.register("alice", "hunter2").unwrap();
        assert!(store.verify("alice", "hunter2").is_ok());
        assert!(matches!(
            store.verify("alice", "wrong"),
            Err(StoreError::CredentialInvalid)
        ));
    }

    #[test]
    fn register_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.bin"), params()).unwrap();
        store.register("alice", "a").unwrap();
        assert!(matches!(
            store.register("alice", "b"),
            Err(StoreError::UserExists)
        ));
    }

    #[test]
    fn verify_unknown_user_rejected() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.bin"), params()).unwrap();
        assert!(matches!(
            store.verify("ghost", "x"),
            Err(StoreError::CredentialInvalid)
        ));
    }

    #[test]
    fn change_password_requires_old() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.bin"), params()).unwrap();
        store.register("alice", "old").unwrap();

        assert!(matches!(
            store.change_password("alice", "wrong", "new"),
            Err(StoreError::CredentialInvalid)
        ));
        store.change_password("alice", "old", "new").unwrap();
        assert!(store.verify("alice", "new").is_ok());
        assert!(store.verify("alice", "old").is_err());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.bin");
        {
            let store = UserStore::open(&path, params()).unwrap();
            store.register("alice", "pw").unwrap();
        }
        let reopened = UserStore::open(&path, params()).unwrap();
        assert!(reopened.verify("alice", "pw").is_ok());
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("does-not-exist.bin"), params()).unwrap();
        assert!(!store.contains("anyone"));
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.bin");
        fs::write(&path, [0xFF, 0x00, 0x00]).unwrap();
        assert!(matches!(
            UserStore::open(&path, params()),
            Err(StoreError::StoreCorrupt(_))
        ));
    }

    #[test]
    fn all_usernames_lists_registered_users() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.bin"), params()).unwrap();
        store.register("alice", "a").unwrap();
        store.register("bob", "b").unwrap();

        let mut names = store.all_usernames();
        names.sort();
        assert_eq!(names, vec!["alice".to_owned(), "bob".to_owned()]);
    }

    #[test]
    fn wire_format_has_version_byte() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.bin");
        let store = UserStore::open(&path, params()).unwrap();
        store.register("alice", "pw").unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(data[0], STORE_VERSION);
    }
}
