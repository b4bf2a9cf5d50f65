//! Poseidon over the Pallas base field.
//!
//! The permutation parameters come from `halo2_gadgets`, which also provides the
//! `Pow5Chip` gadget used by Halo 2 circuits. Both sides therefore share round constants,
//! MDS matrix and modulus; the circuit tests in this crate check it end to end.
use halo2_gadgets::poseidon::primitives::{self as poseidon, ConstantLength, P128Pow5T3};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::FieldElement;

/// Two-to-one and one-to-one hashing over the registry field.
pub trait FieldHasher: Clone + Send + Sync {
    /// Hash of a single element; used for leaves.
    fn hash1(&self, x: FieldElement) -> FieldElement;

    /// Hash of an ordered pair; used for internal nodes.
    fn hash2(&self, a: FieldElement, b: FieldElement) -> FieldElement;
}

/// Poseidon with width 3, rate 2, 8 full and 56 partial rounds.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseidonHasher;

impl FieldHasher for PoseidonHasher {
    fn hash1(&self, x: FieldElement) -> FieldElement {
        poseidon::Hash::<_, P128Pow5T3, ConstantLength<1>, 3, 2>::init()
            .hash([x.inner()])
            .into()
    }

    fn hash2(&self, a: FieldElement, b: FieldElement) -> FieldElement {
        poseidon::Hash::<_, P128Pow5T3, ConstantLength<2>, 3, 2>::init()
            .hash([a.inner(), b.inner()])
            .into()
    }
}

/// Hash scheme named in configuration. Resolved once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashScheme {
    #[default]
    #[serde(rename = "poseidon-p128pow5t3")]
    PoseidonP128Pow5T3,
}

impl HashScheme {
    ///
    pub fn as_str(&self) -> &'static str {
        match self {
            HashScheme::PoseidonP128Pow5T3 => "poseidon-p128pow5t3",
        }
    }

    /// The hasher bound to this scheme.
    pub fn hasher(&self) -> PoseidonHasher {
        match self {
            HashScheme::PoseidonP128Pow5T3 => PoseidonHasher,
        }
    }
}

impl fmt::Display for HashScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poseidon-p128pow5t3" => Ok(HashScheme::PoseidonP128Pow5T3),
            other => Err(format!("unknown hash scheme {other}")),
        }
    }
}
