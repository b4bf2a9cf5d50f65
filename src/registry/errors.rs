use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{chain::ChainError, store::StoreError, ElectionId};

///
#[derive(Error, Debug)]
pub enum RegistryError {
    ///
    #[error("Invalid field element: {0}")]
    InvalidFieldElement(String),

    ///
    #[error("Invalid identifier format: {0}")]
    InvalidIdentifierFormat(String),

    /// The identifier is not below the field modulus. Identifiers are never reduced.
    #[error("Identifier out of range of the hash field")]
    IdentifierOutOfRange,

    ///
    #[error("Cannot build a Merkle tree without leaves")]
    EmptyLeafSet,

    ///
    #[error("Leaf index {index} out of range for a tree of {len} leaves")]
    LeafIndexOutOfRange { index: usize, len: usize },

    ///
    #[error("Invalid proof encoding: {0}")]
    InvalidProofEncoding(String),

    ///
    #[error("No voters registered for election {0}")]
    NoRegistryForElection(ElectionId),

    ///
    #[error("Voter not registered for election {0}")]
    NotRegistered(ElectionId),

    /// The mirror does not reproduce the root published on-chain.
    #[error("Merkle root mismatch for election {election_id}: computed {computed}, on-chain {}", on_chain.as_deref().unwrap_or("<unpublished>"))]
    RootMismatch {
        election_id: ElectionId,
        computed: String,
        on_chain: Option<String>,
    },

    /// On-chain state moved ahead of the mirror. Resolve with `reconcile`.
    #[error("Reconciliation fault for election {election_id} after tx {tx_hash}: {reason}")]
    ReconciliationFault {
        election_id: ElectionId,
        tx_hash: String,
        reason: String,
    },

    ///
    #[error("Chain transaction failed: {reason}")]
    ChainTransactionFailed { reason: String },

    ///
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    ///
    #[error(transparent)]
    MirrorStore(#[from] StoreError),
}

impl From<ChainError> for RegistryError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted { reason } => RegistryError::ChainTransactionFailed { reason },
            ChainError::Unavailable(msg) => RegistryError::ChainUnavailable(msg),
            ChainError::Timeout(ms) => {
                RegistryError::ChainUnavailable(format!("request timed out after {ms} ms"))
            }
        }
    }
}

/// Stable, user-visible classification of a [`RegistryError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFieldElement,
    InvalidIdentifierFormat,
    IdentifierOutOfRange,
    EmptyLeafSet,
    LeafIndexOutOfRange,
    InvalidProofEncoding,
    NoRegistryForElection,
    NotRegistered,
    RootMismatch,
    ReconciliationFault,
    ChainTransactionFailed,
    ChainUnavailable,
    MirrorStore,
}

impl ErrorKind {
    ///
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFieldElement => "invalid_field_element",
            ErrorKind::InvalidIdentifierFormat => "invalid_identifier_format",
            ErrorKind::IdentifierOutOfRange => "identifier_out_of_range",
            ErrorKind::EmptyLeafSet => "empty_leaf_set",
            ErrorKind::LeafIndexOutOfRange => "leaf_index_out_of_range",
            ErrorKind::InvalidProofEncoding => "invalid_proof_encoding",
            ErrorKind::NoRegistryForElection => "no_registry_for_election",
            ErrorKind::NotRegistered => "not_registered",
            ErrorKind::RootMismatch => "root_mismatch",
            ErrorKind::ReconciliationFault => "reconciliation_fault",
            ErrorKind::ChainTransactionFailed => "chain_transaction_failed",
            ErrorKind::ChainUnavailable => "chain_unavailable",
            ErrorKind::MirrorStore => "mirror_store",
        }
    }
}

impl RegistryError {
    ///
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidFieldElement(_) => ErrorKind::InvalidFieldElement,
            RegistryError::InvalidIdentifierFormat(_) => ErrorKind::InvalidIdentifierFormat,
            RegistryError::IdentifierOutOfRange => ErrorKind::IdentifierOutOfRange,
            RegistryError::EmptyLeafSet => ErrorKind::EmptyLeafSet,
            RegistryError::LeafIndexOutOfRange { .. } => ErrorKind::LeafIndexOutOfRange,
            RegistryError::InvalidProofEncoding(_) => ErrorKind::InvalidProofEncoding,
            RegistryError::NoRegistryForElection(_) => ErrorKind::NoRegistryForElection,
            RegistryError::NotRegistered(_) => ErrorKind::NotRegistered,
            RegistryError::RootMismatch { .. } => ErrorKind::RootMismatch,
            RegistryError::ReconciliationFault { .. } => ErrorKind::ReconciliationFault,
            RegistryError::ChainTransactionFailed { .. } => ErrorKind::ChainTransactionFailed,
            RegistryError::ChainUnavailable(_) => ErrorKind::ChainUnavailable,
            RegistryError::MirrorStore(_) => ErrorKind::MirrorStore,
        }
    }
}
