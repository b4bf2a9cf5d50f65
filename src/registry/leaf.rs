use std::{fmt, str::FromStr};

#[cfg(feature = "multicore")]
use rayon::prelude::*;

use super::{
    field::decode_hex32, errors::RegistryError, hasher::FieldHasher, FieldElement, Hash,
};

/// Opaque 256-bit voter identifier, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoterIdentifier(Hash);

impl VoterIdentifier {
    ///
    pub fn from_bytes(bytes: Hash) -> Self {
        VoterIdentifier(bytes)
    }

    /// Exactly 64 hex digits, optionally prefixed by `0x`.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        decode_hex32(s.trim())
            .map(VoterIdentifier)
            .map_err(RegistryError::InvalidIdentifierFormat)
    }

    ///
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl FromStr for VoterIdentifier {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<FieldElement> for VoterIdentifier {
    fn from(value: FieldElement) -> Self {
        VoterIdentifier(value.to_be_bytes())
    }
}

// Identifiers stay out of logs; only a short prefix is printed.
impl fmt::Debug for VoterIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoterIdentifier({}..)", hex::encode(&self.0[..4]))
    }
}

/// Maps voter identifiers to Merkle leaves: `leaf = hash1(identifier)`.
#[derive(Clone, Debug, Default)]
pub struct LeafEncoder<H> {
    hasher: H,
}

impl<H: FieldHasher> LeafEncoder<H> {
    ///
    pub fn new(hasher: H) -> Self {
        LeafEncoder { hasher }
    }

    ///
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// The identifier as a field element. Values at or above the modulus are rejected
    /// rather than reduced, so two identifiers can never share a leaf.
    pub fn encode_identifier(&self, identifier: &VoterIdentifier) -> Result<FieldElement, RegistryError> {
        FieldElement::from_be_bytes(identifier.as_bytes())
            .map_err(|_| RegistryError::IdentifierOutOfRange)
    }

    ///
    pub fn encode_leaf(&self, identifier: &VoterIdentifier) -> Result<FieldElement, RegistryError> {
        let x = self.encode_identifier(identifier)?;
        Ok(self.leaf(x))
    }

    /// Leaf of an identifier already known to be in range.
    pub fn leaf(&self, identifier: FieldElement) -> FieldElement {
        self.hasher.hash1(identifier)
    }

    /// Leaves for identifiers in the given order.
    pub fn leaves(&self, identifiers: &[FieldElement]) -> Vec<FieldElement> {
        #[cfg(feature = "multicore")]
        {
            identifiers.par_iter().map(|x| self.leaf(*x)).collect()
        }
        #[cfg(not(feature = "multicore"))]
        {
            identifiers.iter().map(|x| self.leaf(*x)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PoseidonHasher;

    #[test]
    fn parse_requires_32_bytes() {
        assert!(VoterIdentifier::parse(&"ab".repeat(32)).is_ok());
        assert!(VoterIdentifier::parse(&format!("0x{}", "ab".repeat(32))).is_ok());
        let too_long = "ab".repeat(33);
        let not_hex = "gg".repeat(32);
        for bad in ["", "0x", "abcd", too_long.as_str(), not_hex.as_str()] {
            assert!(matches!(
                VoterIdentifier::parse(bad),
                Err(RegistryError::InvalidIdentifierFormat(_))
            ));
        }
    }

    #[test]
    fn out_of_range_identifiers_are_rejected() {
        let encoder = LeafEncoder::new(PoseidonHasher);
        let max = VoterIdentifier::from_bytes([0xff; 32]);
        assert!(matches!(
            encoder.encode_leaf(&max),
            Err(RegistryError::IdentifierOutOfRange)
        ));

        // p and p + 1 would collide with 0 and 1 if they were reduced.
        let p = VoterIdentifier::parse(
            "40000000000000000000000000000000224698fc094cf91b992d30ed00000001",
        )
        .unwrap();
        assert!(matches!(
            encoder.encode_leaf(&p),
            Err(RegistryError::IdentifierOutOfRange)
        ));
    }

    #[test]
    fn leaf_is_hash1_of_identifier() {
        let hasher = PoseidonHasher;
        let encoder = LeafEncoder::new(hasher);
        let x = FieldElement::from(99u64);
        let id = VoterIdentifier::from(x);
        assert_eq!(encoder.encode_leaf(&id).unwrap(), hasher.hash1(x));
        assert_eq!(encoder.leaves(&[x, x]), vec![hasher.hash1(x); 2]);
    }

    #[test]
    fn debug_does_not_print_the_full_identifier() {
        let id = VoterIdentifier::from_bytes([0x11; 32]);
        let printed = format!("{id:?}");
        assert!(!printed.contains(&"11".repeat(32)));
    }
}
