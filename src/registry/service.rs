//! Read path: membership proofs checked against the on-chain root.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    chain::{ReadRetry, RegistryContract},
    errors::RegistryError,
    hasher::{FieldHasher, PoseidonHasher},
    leaf::{LeafEncoder, VoterIdentifier},
    path::MerkleTree,
    proof::{MerkleProof, ProofCodec, WireProof},
    store::MirrorStore,
    ElectionId, FieldElement,
};
use crate::config::RegistryConfig;

/// Operator view of one election: the mirror's root next to the published one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionMerkleState {
    pub election_id: ElectionId,
    pub voter_count: usize,
    pub computed_root: Option<FieldElement>,
    pub published_root: Option<String>,
    /// Both roots exist and are equal.
    pub consistent: bool,
}

/// Builds proofs from the mirror. Holds no per-election state; every call rebuilds the tree
/// from a fresh snapshot of the mirror.
pub struct ProofService<H: FieldHasher = PoseidonHasher> {
    contract: Arc<dyn RegistryContract>,
    mirror: Arc<dyn MirrorStore>,
    encoder: LeafEncoder<H>,
    codec: ProofCodec,
    retry: ReadRetry,
}

impl ProofService<PoseidonHasher> {
    ///
    pub fn from_config(
        config: &RegistryConfig,
        contract: Arc<dyn RegistryContract>,
        mirror: Arc<dyn MirrorStore>,
    ) -> Self {
        ProofService::new(
            contract,
            mirror,
            LeafEncoder::new(config.hash_scheme.hasher()),
            ProofCodec::new(config.direction_convention),
        )
        .with_read_retry(config.chain.read_retry())
    }
}

impl<H: FieldHasher> ProofService<H> {
    ///
    pub fn new(
        contract: Arc<dyn RegistryContract>,
        mirror: Arc<dyn MirrorStore>,
        encoder: LeafEncoder<H>,
        codec: ProofCodec,
    ) -> Self {
        ProofService {
            contract,
            mirror,
            encoder,
            codec,
            retry: ReadRetry::default(),
        }
    }

    ///
    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    ///
    pub fn encoder(&self) -> &LeafEncoder<H> {
        &self.encoder
    }

    ///
    pub fn codec(&self) -> ProofCodec {
        self.codec
    }

    /// A proof for `identifier` in `election_id`, computed against the mirror and refused
    /// unless its root equals the one published on-chain.
    pub fn get_proof(
        &self,
        election_id: ElectionId,
        identifier: &VoterIdentifier,
    ) -> Result<MerkleProof, RegistryError> {
        let target = self.encoder.encode_identifier(identifier)?;
        let target_leaf = self.encoder.leaf(target);

        let identifiers = self.mirror.identifiers(election_id)?;
        if identifiers.is_empty() {
            return Err(RegistryError::NoRegistryForElection(election_id));
        }
        // The whole tree is built and the published root read before the lookup, so members
        // and strangers go through the same work.
        let tree = MerkleTree::build(self.encoder.hasher(), self.encoder.leaves(&identifiers))?;
        let published = self.published_root(election_id)?;
        let index = tree
            .index_of(&target_leaf)
            .ok_or(RegistryError::NotRegistered(election_id))?;
        let (siblings, sides) = tree.siblings_and_directions(index)?;
        let root = tree.root();

        if !self.same_root(&published, root) {
            tracing::warn!(
                election_id,
                computed = %root,
                on_chain = published.as_deref().unwrap_or("<unpublished>"),
                "refusing proof: root mismatch"
            );
            return Err(RegistryError::RootMismatch {
                election_id,
                computed: root.to_hex(),
                on_chain: published,
            });
        }

        tracing::debug!(election_id, voters = tree.len(), depth = tree.depth(), "built proof");
        Ok(self
            .codec
            .to_wire_proof(election_id, target, siblings, &sides, root))
    }

    /// [`ProofService::get_proof`] from a hex identifier, in the wire shape.
    pub fn get_wire_proof(
        &self,
        election_id: ElectionId,
        identifier: &str,
    ) -> Result<WireProof, RegistryError> {
        let identifier = VoterIdentifier::parse(identifier)?;
        Ok(self.get_proof(election_id, &identifier)?.to_wire())
    }

    ///
    pub fn election_state(&self, election_id: ElectionId) -> Result<ElectionMerkleState, RegistryError> {
        let identifiers = self.mirror.identifiers(election_id)?;
        let computed_root = if identifiers.is_empty() {
            None
        } else {
            let tree =
                MerkleTree::build(self.encoder.hasher(), self.encoder.leaves(&identifiers))?;
            Some(tree.root())
        };
        let published_root = self.published_root(election_id)?;
        let consistent = match computed_root {
            Some(root) => self.same_root(&published_root, root),
            None => false,
        };
        Ok(ElectionMerkleState {
            election_id,
            voter_count: identifiers.len(),
            computed_root,
            published_root,
            consistent,
        })
    }

    fn published_root(&self, election_id: ElectionId) -> Result<Option<String>, RegistryError> {
        Ok(self
            .retry
            .read("merkle_root", || self.contract.merkle_root(election_id))?)
    }

    // Published roots are compared as field elements; an unparsable one never matches.
    fn same_root(&self, published: &Option<String>, root: FieldElement) -> bool {
        published
            .as_deref()
            .and_then(|p| FieldElement::from_hex(p).ok())
            .map_or(false, |p| p == root)
    }
}
