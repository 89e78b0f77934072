use crate::core::{Hash, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;

/// Merkle tree over an ordered list of transaction encodings.
///
/// Nodes live in a per-level arena: `levels[0]` holds the leaf digests and
/// the last level holds the root alone. A level with an odd node count gets
/// its last node duplicated before pairing, so every stored level except the
/// root has even length.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
    leaf_count: usize,
}

/// Inclusion proof for one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub leaf_index: usize,
    pub path: Vec<ProofElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofElement {
    pub hash: Hash,
    /// true if the sibling sits to the right of the running hash
    pub is_right: bool,
}

impl MerkleTree {
    pub fn new<T: AsRef<[u8]>>(data: &[T]) -> Result<MerkleTree> {
        if data.is_empty() {
            return Err(LedgerError::Validation(
                "Cannot build a Merkle tree from an empty list".to_string(),
            ));
        }

        let mut current: Vec<Hash> = data.iter().map(|d| hash_leaf(d.as_ref())).collect();
        let leaf_count = current.len();
        let mut levels = Vec::new();

        while current.len() > 1 {
            if current.len() % 2 != 0 {
                let last = current[current.len() - 1];
                current.push(last);
            }
            let next: Vec<Hash> = current
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels.push(current);

        Ok(MerkleTree { levels, leaf_count })
    }

    pub fn from_transactions(transactions: &[Transaction]) -> Result<MerkleTree> {
        let encoded = transactions
            .iter()
            .map(Transaction::serialize)
            .collect::<Result<Vec<_>>>()?;
        MerkleTree::new(&encoded)
    }

    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of hashing levels above the leaves
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count {
            return Err(LedgerError::NotFound(format!(
                "Merkle leaf {leaf_index} (tree has {} leaves)",
                self.leaf_count
            )));
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = index % 2 == 0;
            let sibling = if is_right { index + 1 } else { index - 1 };
            path.push(ProofElement {
                hash: level[sibling],
                is_right,
            });
            index /= 2;
        }

        Ok(MerkleProof {
            leaf: self.levels[0][leaf_index],
            leaf_index,
            path,
        })
    }
}

impl MerkleProof {
    pub fn verify(&self, root: &Hash) -> bool {
        let computed = self.path.iter().fold(self.leaf, |running, element| {
            if element.is_right {
                hash_pair(&running, &element.hash)
            } else {
                hash_pair(&element.hash, &running)
            }
        });
        computed == *root
    }
}

/// Root over the bincode encodings of `transactions`
pub fn calculate_merkle_root(transactions: &[Transaction]) -> Result<Hash> {
    Ok(MerkleTree::from_transactions(transactions)?.root())
}

fn hash_leaf(data: &[u8]) -> Hash {
    Hash::from_slice(&sha256_digest(data))
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(left.as_bytes());
    combined.extend_from_slice(right.as_bytes());
    Hash::from_slice(&sha256_digest(&combined))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i; 4]).collect()
    }

    #[test]
    fn test_single_leaf_root_is_leaf_digest() {
        let data = items(1);
        let tree = MerkleTree::new(&data).unwrap();
        assert_eq!(tree.root(), hash_leaf(&data[0]));
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_three_leaves_duplicate_the_last() {
        let data = items(3);
        let tree = MerkleTree::new(&data).unwrap();

        let (a, b, c) = (hash_leaf(&data[0]), hash_leaf(&data[1]), hash_leaf(&data[2]));
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let data = items(4);
        let mut swapped = data.clone();
        swapped.swap(0, 1);
        assert_ne!(
            MerkleTree::new(&data).unwrap().root(),
            MerkleTree::new(&swapped).unwrap().root()
        );
        assert_eq!(
            MerkleTree::new(&data).unwrap().root(),
            MerkleTree::new(&data).unwrap().root()
        );
    }

    #[test]
    fn test_empty_list_is_rejected() {
        let data: Vec<Vec<u8>> = vec![];
        assert!(MerkleTree::new(&data).is_err());
    }

    #[test]
    fn test_every_leaf_proof_verifies() {
        for n in 1..=7 {
            let tree = MerkleTree::new(&items(n)).unwrap();
            for i in 0..n as usize {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&tree.root()), "leaf {i} of {n}");
            }
        }
    }

    #[test]
    fn test_proof_fails_against_other_root() {
        let tree = MerkleTree::new(&items(5)).unwrap();
        let other = MerkleTree::new(&items(6)).unwrap();
        let proof = tree.proof(4).unwrap();
        assert!(!proof.verify(&other.root()));
        assert!(tree.proof(5).is_err());
    }
}
