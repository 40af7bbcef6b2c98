//! The merkle module holds the pure functions used to compute and verify Merkle roots over the
//! 64-bit machine address space, as well as the [SparseTree] used to build proofs.
//!
//! Leaves are 8-byte words hashed with Keccak-256; inner nodes hash the concatenation of their
//! children. A subtree of `2^log2_size` bytes is addressed by its aligned starting position.

use crate::error::MerkleError;
use ethers::{types::H256, utils::keccak256};
use std::collections::BTreeMap;

/// The log2 size of a word, the smallest hashed unit of the tree.
pub const LOG2_WORD_SIZE: u8 = 3;
/// The log2 size of the whole address space.
pub const LOG2_ROOT_SIZE: u8 = 64;
/// The log2 size of a 32-byte literal value (four words).
pub const LOG2_LITERAL_SIZE: u8 = 5;

/// Hashes a single 8-byte word into a leaf.
pub fn hash_word(word: &[u8; 8]) -> H256 {
    H256::from(keccak256(word))
}

/// Hashes two sibling nodes into their parent.
pub fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_bytes());
    preimage[32..].copy_from_slice(right.as_bytes());
    H256::from(keccak256(preimage))
}

fn check_log2_size(log2_size: u8) -> Result<(), MerkleError> {
    if (LOG2_WORD_SIZE..=LOG2_ROOT_SIZE).contains(&log2_size) {
        Ok(())
    } else {
        Err(MerkleError::InvalidLog2Size(log2_size))
    }
}

/// Returns true if `position` is aligned to a subtree of `2^log2_size` bytes.
pub fn is_aligned(position: u64, log2_size: u8) -> bool {
    if log2_size >= LOG2_ROOT_SIZE {
        position == 0
    } else {
        position & ((1u64 << log2_size) - 1) == 0
    }
}

/// Checks that a subtree of `2^log2_size` bytes at `position` fits the tree and is aligned.
pub fn check_subtree(position: u64, log2_size: u8) -> Result<(), MerkleError> {
    check_log2_size(log2_size)?;
    if !is_aligned(position, log2_size) {
        return Err(MerkleError::MisalignedPosition {
            position,
            log2_size,
        });
    }
    Ok(())
}

/// Computes the hash of an all-zero region of `2^log2_size` bytes.
pub fn pristine_hash(log2_size: u8) -> Result<H256, MerkleError> {
    check_log2_size(log2_size)?;
    let mut hash = hash_word(&[0u8; 8]);
    for _ in LOG2_WORD_SIZE..log2_size {
        hash = hash_pair(&hash, &hash);
    }
    Ok(hash)
}

/// Computes the root of a set of words. The number of words must be a non-zero power of two.
pub fn root_from_words(words: &[[u8; 8]]) -> Result<H256, MerkleError> {
    if words.is_empty() || !words.len().is_power_of_two() {
        return Err(MerkleError::LeafCount(words.len()));
    }

    let mut level: Vec<H256> = words.iter().map(hash_word).collect();
    while level.len() > 1 {
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    Ok(level[0])
}

/// Computes the root of a 32-byte literal, split into its four big-endian ordered words.
pub fn literal_root(value: &H256) -> H256 {
    let mut words = [[0u8; 8]; 4];
    for (word, chunk) in words.iter_mut().zip(value.as_bytes().chunks_exact(8)) {
        word.copy_from_slice(chunk);
    }
    // Four words always form a valid leaf set.
    root_from_words(&words).unwrap_or_default()
}

/// Recomputes the root of the whole address space given the hash of the subtree of
/// `2^log2_size` bytes at `position` and its siblings, ordered from the bottom up.
///
/// ### Takes
/// - `position`: The aligned position of the subtree.
/// - `log2_size`: The log2 size of the subtree in bytes.
/// - `hash`: The hash of the subtree.
/// - `siblings`: Exactly `64 - log2_size` sibling hashes.
///
/// ### Returns
/// - `Ok(H256)`: The root of the enclosing tree.
/// - `Err(MerkleError)`: The subtree is misaligned or the sibling path has the wrong length.
pub fn root_with_subtree(
    position: u64,
    log2_size: u8,
    hash: H256,
    siblings: &[H256],
) -> Result<H256, MerkleError> {
    check_subtree(position, log2_size)?;
    let expected = (LOG2_ROOT_SIZE - log2_size) as usize;
    if siblings.len() != expected {
        return Err(MerkleError::SiblingCount {
            expected,
            actual: siblings.len(),
        });
    }

    Ok(siblings
        .iter()
        .enumerate()
        .fold(hash, |node, (i, sibling)| {
            if (position >> (log2_size as usize + i)) & 1 == 0 {
                hash_pair(&node, sibling)
            } else {
                hash_pair(sibling, &node)
            }
        }))
}

/// A sparse view of the address space: a pristine tree with a set of mounted subtrees whose
/// hashes are known. Used by claimers to compute the root of a machine and the sibling paths of
/// its drives and output.
#[derive(Debug, Clone, Default)]
pub struct SparseTree {
    /// Mounted subtrees keyed by position, holding their log2 size and hash.
    subtrees: BTreeMap<u64, (u8, H256)>,
}

impl SparseTree {
    /// Creates an empty, fully pristine tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a subtree with a known hash. Fails if it is misaligned or overlaps another mount.
    pub fn mount(&mut self, position: u64, log2_size: u8, hash: H256) -> Result<(), MerkleError> {
        check_subtree(position, log2_size)?;
        let (start, end) = span(position, log2_size);
        let overlaps = self.subtrees.iter().any(|(&p, &(s, _))| {
            let (other_start, other_end) = span(p, s);
            other_start < end && start < other_end
        });
        if overlaps {
            return Err(MerkleError::Overlap { position });
        }
        self.subtrees.insert(position, (log2_size, hash));
        Ok(())
    }

    /// Mounts a 32-byte literal at `position`.
    pub fn mount_literal(&mut self, position: u64, value: &H256) -> Result<(), MerkleError> {
        self.mount(position, LOG2_LITERAL_SIZE, literal_root(value))
    }

    /// Returns the root of the whole address space.
    pub fn root(&self) -> Result<H256, MerkleError> {
        self.node(0, LOG2_ROOT_SIZE)
    }

    /// Returns the bottom-up sibling path of the subtree of `2^log2_size` bytes at `position`.
    pub fn siblings(&self, position: u64, log2_size: u8) -> Result<Vec<H256>, MerkleError> {
        check_subtree(position, log2_size)?;
        (log2_size..LOG2_ROOT_SIZE)
            .map(|level| self.node(((position >> level) ^ 1) << level, level))
            .collect()
    }

    fn node(&self, start: u64, log2_size: u8) -> Result<H256, MerkleError> {
        let (node_start, node_end) = span(start, log2_size);

        // A mount starting at or before this node may cover it entirely.
        if let Some((&p, &(s, hash))) = self.subtrees.range(..=start).next_back() {
            let (_, mount_end) = span(p, s);
            if mount_end > node_start {
                if p == start && s == log2_size {
                    return Ok(hash);
                }
                if s > log2_size {
                    return Err(MerkleError::OpaqueSubtree { position: start });
                }
            }
        }

        let has_content = self
            .subtrees
            .range(start..)
            .next()
            .map_or(false, |(&p, _)| (p as u128) < node_end);
        if !has_content {
            return pristine_hash(log2_size);
        }

        let child = log2_size - 1;
        let left = self.node(start, child)?;
        let right = self.node(start + (1u64 << child), child)?;
        Ok(hash_pair(&left, &right))
    }
}

fn span(position: u64, log2_size: u8) -> (u128, u128) {
    let start = position as u128;
    (start, start + (1u128 << log2_size))
}
