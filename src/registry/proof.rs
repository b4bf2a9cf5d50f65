//! Membership proofs in the shape the voting circuit consumes.
//!
//! A proof is a list of sibling hashes from the leaf up and one direction bit per sibling.
//! The bit says which input of the node hash the running value takes at that level;
//! its polarity is the [`DirectionConvention`] fixed in configuration and must equal the
//! circuit's.
use serde::{Deserialize, Serialize};

use super::{
    errors::RegistryError,
    hasher::FieldHasher,
    path::{replay, Side},
    ElectionId, FieldElement, LeafEncoder, VoterIdentifier,
};

/// How a [`Side`] is written as a bit on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectionConvention {
    /// 0: the proof node is the left hash input and the sibling the right one.
    #[default]
    LeftIsZero,
    /// 1: the proof node is the left input (inverse polarity).
    LeftIsOne,
}

impl DirectionConvention {
    ///
    pub fn bit(&self, side: Side) -> u8 {
        match (self, side) {
            (DirectionConvention::LeftIsZero, Side::Left) => 0,
            (DirectionConvention::LeftIsZero, Side::Right) => 1,
            (DirectionConvention::LeftIsOne, Side::Left) => 1,
            (DirectionConvention::LeftIsOne, Side::Right) => 0,
        }
    }

    ///
    pub fn side(&self, bit: u8) -> Result<Side, RegistryError> {
        match (self, bit) {
            (DirectionConvention::LeftIsZero, 0) | (DirectionConvention::LeftIsOne, 1) => {
                Ok(Side::Left)
            }
            (DirectionConvention::LeftIsZero, 1) | (DirectionConvention::LeftIsOne, 0) => {
                Ok(Side::Right)
            }
            (_, other) => Err(RegistryError::InvalidProofEncoding(format!(
                "direction bit must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// A membership proof for one voter in one election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub election_id: ElectionId,
    pub voter_identifier: FieldElement,
    pub sibling_path: Vec<FieldElement>,
    pub path_direction_bits: Vec<u8>,
    pub root: FieldElement,
    pub convention: DirectionConvention,
}

impl MerkleProof {
    /// The wire shape handed to voting clients.
    pub fn to_wire(&self) -> WireProof {
        WireProof {
            merkle_path: self.sibling_path.iter().map(FieldElement::to_hex).collect(),
            merkle_path_indices: self.path_direction_bits.clone(),
            merkle_root: self.root.to_hex(),
        }
    }

    /// Replays the proof from the voter's leaf and compares with [`MerkleProof::root`].
    pub fn verify<H: FieldHasher>(&self, encoder: &LeafEncoder<H>) -> Result<bool, RegistryError> {
        let leaf = encoder.encode_leaf(&VoterIdentifier::from(self.voter_identifier))?;
        let sides = self
            .path_direction_bits
            .iter()
            .map(|b| self.convention.side(*b))
            .collect::<Result<Vec<_>, _>>()?;
        let root = replay(encoder.hasher(), leaf, &self.sibling_path, &sides)?;
        Ok(root == self.root)
    }
}

/// `{merklePath, merklePathIndices, merkleRoot}` as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProof {
    pub merkle_path: Vec<String>,
    pub merkle_path_indices: Vec<u8>,
    pub merkle_root: String,
}

impl WireProof {
    /// Checked conversion back into field elements and sides.
    pub fn decode(
        &self,
        convention: DirectionConvention,
    ) -> Result<(Vec<FieldElement>, Vec<Side>, FieldElement), RegistryError> {
        if self.merkle_path.len() != self.merkle_path_indices.len() {
            return Err(RegistryError::InvalidProofEncoding(format!(
                "{} path elements but {} indices",
                self.merkle_path.len(),
                self.merkle_path_indices.len()
            )));
        }
        let siblings = self
            .merkle_path
            .iter()
            .map(|h| FieldElement::from_hex(h))
            .collect::<Result<Vec<_>, _>>()?;
        let sides = self
            .merkle_path_indices
            .iter()
            .map(|b| convention.side(*b))
            .collect::<Result<Vec<_>, _>>()?;
        let root = FieldElement::from_hex(&self.merkle_root)?;
        Ok((siblings, sides, root))
    }
}

/// Turns the accumulator's sibling/side output into [`MerkleProof`]s. No hashing happens here.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProofCodec {
    convention: DirectionConvention,
}

impl ProofCodec {
    ///
    pub fn new(convention: DirectionConvention) -> Self {
        ProofCodec { convention }
    }

    ///
    pub fn convention(&self) -> DirectionConvention {
        self.convention
    }

    ///
    pub fn to_wire_proof(
        &self,
        election_id: ElectionId,
        voter_identifier: FieldElement,
        siblings: Vec<FieldElement>,
        sides: &[Side],
        root: FieldElement,
    ) -> MerkleProof {
        MerkleProof {
            election_id,
            voter_identifier,
            sibling_path: siblings,
            path_direction_bits: sides.iter().map(|s| self.convention.bit(*s)).collect(),
            root,
            convention: self.convention,
        }
    }
}
