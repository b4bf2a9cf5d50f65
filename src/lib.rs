//! # voter-registry
//!
//! Off-chain half of a blockchain voting registry. Opaque 256-bit voter identifiers are
//! registered on-chain and mirrored locally; per election, the mirrored identifiers are
//! folded into a Poseidon Merkle tree whose root is published on-chain, and each voter can
//! fetch a membership proof that a zero-knowledge circuit consumes to authorize a ballot
//! without revealing which identifier is theirs.
//!
//! The crate is organised around two paths:
//!
//! - the write path, [`registry::VoterRegistrySync`], which validates identifier batches,
//!   submits them to the [`registry::RegistryContract`] and persists them into the
//!   [`registry::MirrorStore`];
//! - the read path, [`registry::ProofService`], which rebuilds the
//!   [`registry::MerkleTree`] from the mirror and hands out [`registry::MerkleProof`]s
//!   checked against the on-chain root.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod registry;

pub use config::{ConfigError, RegistryConfig};
pub use registry::RegistryError;
