use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Stable identifier handed out at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Usernames longer than this are rejected.
pub const MAX_USERNAME_LEN: usize = 20;

/// Credential check and registration used by the session gate.
pub trait AccountStore: Send + Sync {
    fn register(&self, username: &str, password: &str) -> Result<UserId, AccountError>;
    fn authenticate(&self, username: &str, password: &str) -> Result<UserId, AccountError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Username already exists!")]
    Conflict,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("account storage failure: {0}")]
    Storage(#[from] io::Error),
    #[error("account file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("account store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    id: UserId,
    username: String,
    password_hash: String,
}

/// Accounts held in memory and, when a path is set, mirrored to a JSON file
/// after every registration.
#[derive(Debug)]
pub struct FileAccountStore {
    path: Option<PathBuf>,
    cost: u32,
    accounts: RwLock<Vec<StoredAccount>>,
}

impl FileAccountStore {
    pub fn open(path: impl Into<PathBuf>, cost: u32) -> Result<Self, AccountError> {
        let path = path.into();
        let accounts = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), accounts = accounts.len(), "account store loaded");

        Ok(Self {
            path: Some(path),
            cost,
            accounts: RwLock::new(accounts),
        })
    }

    pub fn in_memory(cost: u32) -> Self {
        Self {
            path: None,
            cost,
            accounts: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(path: &Path, accounts: &[StoredAccount]) -> Result<(), AccountError> {
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(accounts)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

fn normalize_username(username: &str) -> Result<&str, AccountError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AccountError::InvalidInput("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AccountError::InvalidInput(
            "username must be at most 20 characters",
        ));
    }
    Ok(username)
}

impl AccountStore for FileAccountStore {
    fn register(&self, username: &str, password: &str) -> Result<UserId, AccountError> {
        let username = normalize_username(username)?;
        if password.is_empty() {
            return Err(AccountError::InvalidInput("password is required"));
        }

        {
            let accounts = self.accounts.read().map_err(|_| AccountError::Poisoned)?;
            if accounts.iter().any(|account| account.username == username) {
                return Err(AccountError::Conflict);
            }
        }

        // Hashing is slow on purpose; keep it outside the write lock.
        let password_hash = bcrypt::hash(password, self.cost)?;

        let mut accounts = self.accounts.write().map_err(|_| AccountError::Poisoned)?;
        if accounts.iter().any(|account| account.username == username) {
            return Err(AccountError::Conflict);
        }

        let id = UserId(accounts.iter().map(|account| account.id.0).max().unwrap_or(0) + 1);
        accounts.push(StoredAccount {
            id,
            username: username.to_string(),
            password_hash,
        });

        if let Some(path) = &self.path {
            if let Err(err) = Self::persist(path, &accounts) {
                accounts.pop();
                return Err(err);
            }
        }

        info!(user_id = id.0, "account registered");
        Ok(id)
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<UserId, AccountError> {
        let username = username.trim();
        let account = {
            let accounts = self.accounts.read().map_err(|_| AccountError::Poisoned)?;
            accounts
                .iter()
                .find(|account| account.username == username)
                .cloned()
        };

        let Some(account) = account else {
            return Err(AccountError::InvalidCredentials);
        };

        if bcrypt::verify(password, &account.password_hash)? {
            Ok(account.id)
        } else {
            Err(AccountError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn register_then_authenticate() {
        let store = FileAccountStore::in_memory(TEST_COST);
        let id = store.register("asha", "s3cret").expect("registers");
        assert_eq!(store.authenticate("asha", "s3cret").expect("authenticates"), id);
        assert!(matches!(
            store.authenticate("asha", "wrong"),
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            store.authenticate("nobody", "s3cret"),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_usernames_conflict() {
        let store = FileAccountStore::in_memory(TEST_COST);
        store.register("asha", "one").expect("first registration");
        assert!(matches!(
            store.register(" asha ", "two"),
            Err(AccountError::Conflict)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_blank_and_overlong_usernames() {
        let store = FileAccountStore::in_memory(TEST_COST);
        assert!(matches!(
            store.register("  ", "pw"),
            Err(AccountError::InvalidInput(_))
        ));
        assert!(matches!(
            store.register(&"x".repeat(MAX_USERNAME_LEN + 1), "pw"),
            Err(AccountError::InvalidInput(_))
        ));
        assert!(matches!(
            store.register("asha", ""),
            Err(AccountError::InvalidInput(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn accounts_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("accounts.json");

        let first = FileAccountStore::open(&path, TEST_COST).expect("opens");
        let id = first.register("asha", "s3cret").expect("registers");
        let second = first.register("ravi", "hunter2").expect("registers");
        assert_ne!(id, second);
        drop(first);

        let reopened = FileAccountStore::open(&path, TEST_COST).expect("reopens");
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.authenticate("asha", "s3cret").expect("authenticates"),
            id
        );

        let raw = fs::read_to_string(&path).expect("file written");
        assert!(!raw.contains("s3cret"), "passwords must not be stored in clear");
    }
}
