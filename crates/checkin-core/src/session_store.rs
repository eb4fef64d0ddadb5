//! Flat JSON session store
//!
//! Maps an account identifier to its last known session. Loaded once at the
//! start of a run, updated in memory by the coordinator, and rewritten as a
//! whole file on save.
//!
//! Older stores kept the raw cookie jar per account
//! (`{"alice": {"cookies": {"session": ".."}, "id": 7}}`); those entries are
//! read as if they had been written by [`SessionStore::save`] and converted on
//! the next save.

use crate::core_types::Session;
use crate::errors::CheckinError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub session_token: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default = "Local::now")]
    pub acquired_at: DateTime<Local>,
}

const LEGACY_SESSION_COOKIE: &str = "session";

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(StoredSession),
    Legacy {
        cookies: HashMap<String, String>,
        #[serde(default)]
        id: Option<i64>,
    },
}

impl StoredRecord {
    fn into_session(self) -> Option<StoredSession> {
        match self {
            StoredRecord::Current(stored) => Some(stored),
            StoredRecord::Legacy { mut cookies, id } => {
                let token = match cookies.remove(LEGACY_SESSION_COOKIE) {
                    Some(token) => token,
                    None if cookies.len() == 1 => cookies.into_values().next()?,
                    None => return None,
                };
                Some(StoredSession {
                    session_token: token,
                    user_id: id,
                    acquired_at: Local::now(),
                })
            }
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredSession>,
}

impl SessionStore {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the store; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CheckinError> {
        let path = path.into();
        if !path.exists() {
            log::info!("Session store {} does not exist yet", path.display());
            return Ok(Self::empty(path));
        }
        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Self::empty(path));
        }
        let records: BTreeMap<String, StoredRecord> = serde_json::from_str(&content).map_err(|e| {
            CheckinError::Validation(format!(
                "Session store {} is not valid: {}",
                path.display(),
                e
            ))
        })?;
        let mut entries = BTreeMap::new();
        for (identifier, record) in records {
            match record.into_session() {
                Some(stored) => {
                    entries.insert(identifier, stored);
                }
                None => log::warn!(
                    "Session store entry for {} has no session cookie; ignoring it",
                    identifier
                ),
            }
        }
        log::info!("Loaded {} session(s) from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<Session> {
        self.entries.get(identifier).map(|stored| Session {
            identifier: identifier.to_string(),
            session_token: stored.session_token.clone(),
            user_id: stored.user_id,
            acquired_at: stored.acquired_at,
        })
    }

    /// Last write wins.
    pub fn upsert(&mut self, session: Session) {
        self.entries.insert(
            session.identifier,
            StoredSession {
                session_token: session.session_token,
                user_id: session.user_id,
                acquired_at: session.acquired_at,
            },
        );
    }

    pub fn sessions(&self) -> impl Iterator<Item = Session> + '_ {
        self.entries.keys().filter_map(|identifier| self.get(identifier))
    }

    pub fn save(&self) -> Result<(), CheckinError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        crate::fsutil::write_atomic(&self.path, json.as_bytes())?;
        log::debug!("Wrote {} session(s) to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
