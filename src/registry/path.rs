use serde::{Deserialize, Serialize};

use super::{errors::RegistryError, hasher::FieldHasher, FieldElement};

/// Which input of the node hash the proof node occupied at one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// `hash2(node, sibling)`
    Left,
    /// `hash2(sibling, node)`
    Right,
}

/// Internal node hash: children are ordered by numeric value before hashing.
pub fn node_hash<H: FieldHasher>(hasher: &H, a: FieldElement, b: FieldElement) -> FieldElement {
    if a <= b {
        hasher.hash2(a, b)
    } else {
        hasher.hash2(b, a)
    }
}

/// Recomputes a root from a leaf and its authentication path.
pub fn replay<H: FieldHasher>(
    hasher: &H,
    leaf: FieldElement,
    siblings: &[FieldElement],
    sides: &[Side],
) -> Result<FieldElement, RegistryError> {
    if siblings.len() != sides.len() {
        return Err(RegistryError::InvalidProofEncoding(format!(
            "{} siblings but {} directions",
            siblings.len(),
            sides.len()
        )));
    }
    let root = siblings
        .iter()
        .zip(sides)
        .fold(leaf, |node, (sibling, side)| match side {
            Side::Left => hasher.hash2(node, *sibling),
            Side::Right => hasher.hash2(*sibling, node),
        });
    Ok(root)
}

/// Position of `leaf` in `leaves`. Callers pass the re-encoded leaf of the identifier they
/// look for, never the raw identifier.
pub fn index_of(leaves: &[FieldElement], leaf: &FieldElement) -> Option<usize> {
    leaves.iter().position(|l| l == leaf)
}

/// Binary Merkle tree over an ordered list of leaves.
///
/// Pairs are formed by position; an unpaired last node is carried to the next level
/// unchanged. Building twice from the same ordered leaves gives the same tree.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    layers: Vec<Vec<FieldElement>>,
}

impl MerkleTree {
    ///
    pub fn build<H: FieldHasher>(
        hasher: &H,
        leaves: Vec<FieldElement>,
    ) -> Result<Self, RegistryError> {
        if leaves.is_empty() {
            return Err(RegistryError::EmptyLeafSet);
        }

        let mut layers = vec![leaves];
        loop {
            let layer = &layers[layers.len() - 1];
            if layer.len() == 1 {
                break;
            }
            let pairs = layer.chunks_exact(2);
            let carry = pairs.remainder().first().copied();
            let mut next_layer = Vec::with_capacity(layer.len() / 2 + 1);
            next_layer.extend(pairs.map(|pair| node_hash(hasher, pair[0], pair[1])));
            next_layer.extend(carry);
            layers.push(next_layer);
        }

        Ok(MerkleTree { layers })
    }

    ///
    pub fn root(&self) -> FieldElement {
        self.layers[self.layers.len() - 1][0]
    }

    ///
    pub fn leaves(&self) -> &[FieldElement] {
        &self.layers[0]
    }

    ///
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    /// Always false: a tree has at least one leaf.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of hashing levels above the leaves.
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    ///
    pub fn index_of(&self, leaf: &FieldElement) -> Option<usize> {
        index_of(self.leaves(), leaf)
    }

    /// Siblings from the leaf up, and the side the proof node took at each of those levels.
    /// Levels where the node was carried contribute nothing.
    pub fn siblings_and_directions(
        &self,
        index: usize,
    ) -> Result<(Vec<FieldElement>, Vec<Side>), RegistryError> {
        if index >= self.len() {
            return Err(RegistryError::LeafIndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut sides = Vec::with_capacity(self.depth());
        let mut p = index;
        for layer in &self.layers[..self.depth()] {
            let node = layer[p];
            if let Some(sibling) = layer.get(p ^ 1) {
                siblings.push(*sibling);
                sides.push(if node <= *sibling { Side::Left } else { Side::Right });
            }
            p /= 2;
        }
        Ok((siblings, sides))
    }
}
