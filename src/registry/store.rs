//! Off-chain mirror of the on-chain voter registry.
//!
//! The mirror is the source of truth for tree construction. Identifiers of an election are
//! always returned in registration sequence order, which is the canonical leaf order.
use std::{
    collections::BTreeSet,
    fs,
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError},
    Db, Transactional, Tree,
};
use thiserror::Error;

use super::{ElectionId, FieldElement};

///
#[derive(Error, Debug)]
pub enum StoreError {
    ///
    #[error("mirror db error: {0}")]
    Sled(#[from] sled::Error),

    ///
    #[error("mirror record encoding error: {0}")]
    Codec(#[from] bincode::Error),

    ///
    #[error("corrupt mirror record: {0}")]
    Corrupt(String),

    ///
    #[error("mirror store unavailable: {0}")]
    Unavailable(String),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Sled(e),
        }
    }
}

/// One mirrored registration. Never mutated once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredVoter {
    pub election_id: ElectionId,
    pub identifier: FieldElement,
    pub registered_at: DateTime<Utc>,
}

/// Persistence for registered voters, keyed by `(election, identifier)`.
pub trait MirrorStore: Send + Sync {
    /// Appends the identifiers not yet present, in the given order, all or nothing.
    /// Returns the records actually written.
    fn insert_batch(
        &self,
        election_id: ElectionId,
        identifiers: &[FieldElement],
        registered_at: DateTime<Utc>,
    ) -> Result<Vec<RegisteredVoter>, StoreError>;

    /// Records of an election in canonical order.
    fn voters(&self, election_id: ElectionId) -> Result<Vec<RegisteredVoter>, StoreError>;

    /// Identifiers of an election in canonical order.
    fn identifiers(&self, election_id: ElectionId) -> Result<Vec<FieldElement>, StoreError> {
        Ok(self
            .voters(election_id)?
            .into_iter()
            .map(|v| v.identifier)
            .collect())
    }

    ///
    fn contains(&self, election_id: ElectionId, identifier: &FieldElement) -> Result<bool, StoreError>;

    /// Returns whether a record was removed.
    fn remove(&self, election_id: ElectionId, identifier: &FieldElement) -> Result<bool, StoreError>;

    /// Replaces every record of an election with `voters`, in that order.
    fn replace_election(
        &self,
        election_id: ElectionId,
        voters: &[RegisteredVoter],
    ) -> Result<(), StoreError>;

    /// Elections with at least one record.
    fn election_ids(&self) -> Result<Vec<ElectionId>, StoreError>;
}

const VOTERS_TREE: &str = "voters";
const INDEX_TREE: &str = "voter_index";
const SEQUENCE_TREE: &str = "sequence";

/// `sled` backed mirror.
///
/// - `voters`: `election ‖ seq` → record
/// - `voter_index`: `election ‖ identifier` → `seq`
/// - `sequence`: `election` → next `seq`
#[derive(Clone)]
pub struct SledMirrorStore {
    db: Db,
    voters: Tree,
    index: Tree,
    sequence: Tree,
}

impl SledMirrorStore {
    /// Opens (or creates) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    StoreError::Unavailable(format!(
                        "failed to create directory for mirror db at {}: {}",
                        path_ref.display(),
                        err
                    ))
                })?;
            }
        }
        let db = sled::open(path_ref)?;
        tracing::info!(path = %path_ref.display(), "opened voter mirror");
        Self::from_db(db)
    }

    /// A store that lives in memory and disappears on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(SledMirrorStore {
            voters: db.open_tree(VOTERS_TREE)?,
            index: db.open_tree(INDEX_TREE)?,
            sequence: db.open_tree(SEQUENCE_TREE)?,
            db,
        })
    }

    ///
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn voter_key(election_id: ElectionId, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&election_id.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn index_key(election_id: ElectionId, identifier: &FieldElement) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..8].copy_from_slice(&election_id.to_be_bytes());
    key[8..].copy_from_slice(&identifier.to_be_bytes());
    key
}

fn read_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn abort<T>(err: impl Into<StoreError>) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

impl MirrorStore for SledMirrorStore {
    fn insert_batch(
        &self,
        election_id: ElectionId,
        identifiers: &[FieldElement],
        registered_at: DateTime<Utc>,
    ) -> Result<Vec<RegisteredVoter>, StoreError> {
        let written = (&self.voters, &self.index, &self.sequence).transaction(
            |(voters, index, sequence)| {
                let election_key = election_id.to_be_bytes();
                let mut next = match sequence.get(election_key)? {
                    Some(raw) => match read_u64(&raw) {
                        Ok(seq) => seq,
                        Err(e) => return abort(e),
                    },
                    None => 0,
                };

                let mut written = Vec::with_capacity(identifiers.len());
                for identifier in identifiers {
                    let ikey = index_key(election_id, identifier);
                    if index.get(ikey)?.is_some() {
                        continue;
                    }
                    let record = RegisteredVoter {
                        election_id,
                        identifier: *identifier,
                        registered_at,
                    };
                    let value = match bincode::serialize(&record) {
                        Ok(value) => value,
                        Err(e) => return abort(e),
                    };
                    voters.insert(&voter_key(election_id, next)[..], value)?;
                    index.insert(&ikey[..], &next.to_be_bytes()[..])?;
                    next += 1;
                    written.push(record);
                }
                sequence.insert(&election_key[..], &next.to_be_bytes()[..])?;
                Ok::<_, ConflictableTransactionError<StoreError>>(written)
            },
        )?;
        Ok(written)
    }

    fn voters(&self, election_id: ElectionId) -> Result<Vec<RegisteredVoter>, StoreError> {
        self.voters
            .scan_prefix(election_id.to_be_bytes())
            .values()
            .map(|value| {
                let value = value?;
                Ok(bincode::deserialize::<RegisteredVoter>(&value)?)
            })
            .collect()
    }

    fn contains(&self, election_id: ElectionId, identifier: &FieldElement) -> Result<bool, StoreError> {
        Ok(self.index.contains_key(index_key(election_id, identifier))?)
    }

    fn remove(&self, election_id: ElectionId, identifier: &FieldElement) -> Result<bool, StoreError> {
        let removed = (&self.voters, &self.index).transaction(|(voters, index)| {
            let ikey = index_key(election_id, identifier);
            match index.remove(&ikey[..])? {
                Some(raw) => {
                    let seq = match read_u64(&raw) {
                        Ok(seq) => seq,
                        Err(e) => return abort(e),
                    };
                    voters.remove(&voter_key(election_id, seq)[..])?;
                    Ok::<_, ConflictableTransactionError<StoreError>>(true)
                }
                None => Ok(false),
            }
        })?;
        Ok(removed)
    }

    fn replace_election(
        &self,
        election_id: ElectionId,
        voters: &[RegisteredVoter],
    ) -> Result<(), StoreError> {
        let stale_voters: Vec<_> = self
            .voters
            .scan_prefix(election_id.to_be_bytes())
            .keys()
            .collect::<Result<_, _>>()?;
        let stale_index: Vec<_> = self
            .index
            .scan_prefix(election_id.to_be_bytes())
            .keys()
            .collect::<Result<_, _>>()?;

        (&self.voters, &self.index, &self.sequence).transaction(|(tx_voters, index, sequence)| {
            for key in &stale_voters {
                tx_voters.remove(key.clone())?;
            }
            for key in &stale_index {
                index.remove(key.clone())?;
            }
            let mut seen = BTreeSet::new();
            let mut next = 0u64;
            for voter in voters {
                if !seen.insert(voter.identifier) {
                    continue;
                }
                let record = RegisteredVoter {
                    election_id,
                    ..voter.clone()
                };
                let value = match bincode::serialize(&record) {
                    Ok(value) => value,
                    Err(e) => return abort(e),
                };
                tx_voters.insert(&voter_key(election_id, next)[..], value)?;
                index.insert(
                    &index_key(election_id, &voter.identifier)[..],
                    &next.to_be_bytes()[..],
                )?;
                next += 1;
            }
            sequence.insert(&election_id.to_be_bytes()[..], &next.to_be_bytes()[..])?;
            Ok::<_, ConflictableTransactionError<StoreError>>(())
        })?;
        Ok(())
    }

    fn election_ids(&self) -> Result<Vec<ElectionId>, StoreError> {
        let mut ids = BTreeSet::new();
        for key in self.index.iter().keys() {
            let key = key?;
            ids.insert(read_u64(&key[..8])?);
        }
        Ok(ids.into_iter().collect())
    }
}
