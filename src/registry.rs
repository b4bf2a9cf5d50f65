//! Voter registry and Merkle membership proofs
mod api;
mod audit;
mod chain;
#[cfg(test)]
mod circuit;
mod errors;
mod field;
mod hasher;
mod leaf;
mod path;
mod proof;
mod service;
mod store;
mod sync;

pub use api::{handle_proof_request, ErrorResponse, ProofRequest, ProofResponse};
pub use audit::{AuditAction, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
#[cfg(any(test, feature = "test-dependencies"))]
pub use chain::InMemoryRegistryContract;
pub use chain::{
    ChainError, ReadRetry, RegistryContract, RegistryEvent, RegistryEventKind, TxReceipt,
};
pub use errors::{ErrorKind, RegistryError};
pub use field::FieldElement;
pub use hasher::{FieldHasher, HashScheme, PoseidonHasher};
pub use leaf::{LeafEncoder, VoterIdentifier};
pub use path::{index_of, node_hash, replay, MerkleTree, Side};
pub use proof::{DirectionConvention, MerkleProof, ProofCodec, WireProof};
pub use service::{ElectionMerkleState, ProofService};
pub use store::{MirrorStore, RegisteredVoter, SledMirrorStore, StoreError};
pub use sync::{
    BatchOutcome, PublishPolicy, ReconcileReport, RejectReason, Rejection, RemovalOutcome,
    RootPublication, VoterRegistrySync,
};

/// Election identifier, as used by the registry contract.
pub type ElectionId = u64;

type Hash = [u8; 32];
