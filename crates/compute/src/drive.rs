//! The drive module holds the [Drive] record and the [DriveCommitments] manager that resolves
//! every drive of an instance to a content hash.

use crate::{
    error::{ComputeError, Result},
    merkle::{self, LOG2_LITERAL_SIZE},
    Logger,
};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// An input region of the disputed computation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    /// The aligned address of the drive in the machine.
    pub position: u64,
    /// The log2 of the drive size in bytes.
    pub log2_size: u8,
    /// The literal contents of the drive, for drives that do not need the logger.
    pub direct_value: H256,
    /// The root of the contents stored in the logger.
    pub logger_root: H256,
    /// The party allowed to submit the contents of the drive.
    pub provider: Address,
    /// The contents are submitted by `provider` after instantiation.
    pub needs_provider: bool,
    /// The contents live in the logger and the drive hash is a logger root.
    pub needs_logger: bool,
}

/// The [Resolution] enum names the single path by which a [Drive] gets its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The literal `direct_value` is hashed at instantiation.
    Literal,
    /// The stored `logger_root` is used once it is available in the logger.
    Logged,
    /// The provider submits the literal value.
    ProvidedLiteral,
    /// The provider submits the logger root.
    ProvidedLog,
}

impl Drive {
    /// Returns the [Resolution] path selected by the drive flags.
    pub fn resolution(&self) -> Resolution {
        match (self.needs_logger, self.needs_provider) {
            (false, false) => Resolution::Literal,
            (true, false) => Resolution::Logged,
            (false, true) => Resolution::ProvidedLiteral,
            (true, true) => Resolution::ProvidedLog,
        }
    }

    /// Returns true if the drive is resolved from a literal value.
    pub fn is_literal(&self) -> bool {
        !self.needs_logger
    }

    /// Returns true if the address ranges of the two drives intersect.
    pub fn overlaps(&self, other: &Drive) -> bool {
        let (start, end) = self.span();
        let (other_start, other_end) = other.span();
        start < other_end && other_start < end
    }

    fn span(&self) -> (u128, u128) {
        let start = self.position as u128;
        (start, start + (1u128 << self.log2_size))
    }

    fn validate(&self, index: usize) -> Result<()> {
        merkle::check_subtree(self.position, self.log2_size)
            .map_err(|source| ComputeError::InvalidDrive { index, source })?;
        if self.is_literal() && self.log2_size != LOG2_LITERAL_SIZE {
            return Err(ComputeError::LiteralSize {
                index,
                log2_size: self.log2_size,
                required: LOG2_LITERAL_SIZE,
            });
        }
        Ok(())
    }
}

/// The [DriveCommitments] struct tracks the drives of an instance, their resolved hashes, and the
/// queue of drives still waiting on their provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveCommitments {
    drives: Vec<Drive>,
    /// Parallel to `drives`; zero while unresolved.
    hashes: Vec<H256>,
    /// Indices into `drives`, in submission order.
    pending: Vec<usize>,
    /// The next entry of `pending` to be resolved.
    cursor: usize,
}

impl DriveCommitments {
    /// Validates the drives and resolves every drive that does not need provider input.
    ///
    /// Drives must occupy disjoint regions, and a drive left pending must name the provider
    /// that will resolve it.
    pub fn resolve(drives: Vec<Drive>, logger: &dyn Logger) -> Result<Self> {
        let mut hashes = vec![H256::zero(); drives.len()];
        let mut pending = Vec::new();

        for (index, drive) in drives.iter().enumerate() {
            drive.validate(index)?;
            if let Some(other) = drives[..index].iter().position(|o| o.overlaps(drive)) {
                return Err(ComputeError::DriveOverlap { index, other });
            }
            match drive.resolution() {
                Resolution::Literal => hashes[index] = merkle::literal_root(&drive.direct_value),
                Resolution::Logged
                    if logger.is_log_available(drive.logger_root, drive.log2_size) =>
                {
                    hashes[index] = drive.logger_root
                }
                _ if drive.provider.is_zero() => {
                    return Err(ComputeError::MissingProvider { index })
                }
                _ => pending.push(index),
            }
        }

        Ok(Self {
            drives,
            hashes,
            pending,
            cursor: 0,
        })
    }

    /// Returns true once every pending drive has been resolved.
    pub fn all_resolved(&self) -> bool {
        self.cursor == self.pending.len()
    }

    /// Returns the index and the record of the drive that must be resolved next.
    pub fn current(&self) -> Option<(usize, &Drive)> {
        let index = *self.pending.get(self.cursor)?;
        Some((index, &self.drives[index]))
    }

    /// Resolves the current pending drive with a literal value submitted by its provider.
    ///
    /// ### Returns
    /// - `Ok((usize, H256))`: The index of the resolved drive and its hash.
    /// - `Err(ComputeError)`: No drive is pending, the caller is not its provider, or the drive
    ///   does not take a literal value.
    pub fn claim_direct(&mut self, caller: Address, value: H256) -> Result<(usize, H256)> {
        let (index, drive) = self.current().ok_or(ComputeError::NoPendingDrive)?;
        check_provider(drive, caller)?;
        if !drive.is_literal() {
            return Err(ComputeError::WrongDriveKind {
                index,
                expected: "direct",
            });
        }

        let hash = merkle::literal_root(&value);
        self.drives[index].direct_value = value;
        Ok(self.advance(index, hash))
    }

    /// Resolves the current pending drive with a logger root submitted by its provider. A drive
    /// whose root is up to the provider adopts `root`; otherwise `root` must match the stored
    /// one. Either way the root must be available in the logger.
    pub fn claim_logger(
        &mut self,
        caller: Address,
        root: H256,
        logger: &dyn Logger,
    ) -> Result<(usize, H256)> {
        let (index, drive) = self.current().ok_or(ComputeError::NoPendingDrive)?;
        check_provider(drive, caller)?;
        match drive.resolution() {
            Resolution::ProvidedLog => {}
            Resolution::Logged if drive.logger_root == root => {}
            Resolution::Logged => {
                return Err(ComputeError::RootMismatch {
                    index,
                    submitted: root,
                    stored: drive.logger_root,
                })
            }
            Resolution::Literal | Resolution::ProvidedLiteral => {
                return Err(ComputeError::WrongDriveKind {
                    index,
                    expected: "logger",
                })
            }
        }
        if !logger.is_log_available(root, drive.log2_size) {
            return Err(ComputeError::LogUnavailable {
                root,
                log2_size: drive.log2_size,
            });
        }

        self.drives[index].logger_root = root;
        Ok(self.advance(index, root))
    }

    fn advance(&mut self, index: usize, hash: H256) -> (usize, H256) {
        self.hashes[index] = hash;
        self.cursor += 1;
        (index, hash)
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn hashes(&self) -> &[H256] {
        &self.hashes
    }

    pub fn pending(&self) -> &[usize] {
        &self.pending
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

fn check_provider(drive: &Drive, caller: Address) -> Result<()> {
    if drive.provider == caller {
        Ok(())
    } else {
        Err(ComputeError::Unauthorized {
            caller,
            expected: drive.provider,
        })
    }
}
