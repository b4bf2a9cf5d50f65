//! Canonical field element type and its boundary conversions.
//!
//! Every hash input and output in the registry is a [`FieldElement`]. Bytes and hex strings
//! only exist at the edges (contract calls, mirror records, wire proofs); they are turned
//! into field elements here, with a range check, and nowhere else.
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash as StdHash, Hasher},
    str::FromStr,
};

use ff::PrimeField as _;
use pasta_curves::Fp;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::{errors::RegistryError, Hash};

/// An integer in `[0, p)` for the Pallas base field modulus `p`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldElement(Fp);

impl FieldElement {
    /// Parses 32 big-endian bytes. Fails if the value is not below the modulus.
    pub fn from_be_bytes(bytes: &Hash) -> Result<Self, RegistryError> {
        let mut repr = *bytes;
        repr.reverse();
        CtOpt(Fp::from_repr(repr))
            .into_option()
            .map(FieldElement)
            .ok_or_else(|| {
                RegistryError::InvalidFieldElement("value is not below the field modulus".into())
            })
    }

    /// 32 big-endian bytes.
    pub fn to_be_bytes(&self) -> Hash {
        let mut bytes = self.0.to_repr();
        bytes.reverse();
        bytes
    }

    /// Parses 64 hex digits, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        let bytes = decode_hex32(s).map_err(RegistryError::InvalidFieldElement)?;
        Self::from_be_bytes(&bytes)
    }

    /// `0x` followed by 64 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    ///
    pub fn inner(&self) -> Fp {
        self.0
    }
}

impl From<Fp> for FieldElement {
    fn from(value: Fp) -> Self {
        FieldElement(value)
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        FieldElement(Fp::from(value))
    }
}

impl FromStr for FieldElement {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Numeric order of the canonical integer; the Merkle node hash sorts children by it.
impl Ord for FieldElement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_be_bytes().cmp(&other.to_be_bytes())
    }
}

impl PartialOrd for FieldElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl StdHash for FieldElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_repr().hash(state);
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Decodes exactly 32 bytes of hex, tolerating a `0x` prefix.
pub(crate) fn decode_hex32(s: &str) -> Result<Hash, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() != 64 {
        return Err(format!("expected 64 hex digits, got {}", digits.len()));
    }
    let bytes = hex::decode(digits).map_err(|e| e.to_string())?;
    Ok(as_byte256(&bytes))
}

#[derive(Debug)]
pub(crate) struct CtOpt<T>(pub(crate) subtle::CtOption<T>);

impl<T> CtOpt<T> {
    pub fn into_option(self) -> Option<T> {
        self.0.into()
    }
}

pub(crate) fn as_byte256(h: &[u8]) -> Hash {
    let mut hh = [0u8; 32];
    hh.copy_from_slice(h);
    hh
}
