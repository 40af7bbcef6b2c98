//! The `error` module contains the [ComputeError] and [MerkleError] types returned by every
//! fallible operation of the crate.

use crate::{InstanceId, State};
use ethers::types::{Address, H256};
use thiserror::Error;

/// Result type alias using [ComputeError].
pub type Result<T> = std::result::Result<T, ComputeError>;

/// The [ErrorKind] enum classifies a [ComputeError] by the kind of precondition that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller is not allowed to perform the operation.
    Authorization,
    /// The operation was invoked outside of the state it requires.
    StateGuard,
    /// The submitted data does not agree with the stored data, or a proof is invalid.
    DataConsistency,
    /// A deadline has not elapsed yet or already has, or an external verdict is not final yet.
    Temporal,
    /// A state value could not be recognized.
    UnrecognizedState,
}

/// Errors produced by the Merkle verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("log2 size {0} is outside of the tree bounds")]
    InvalidLog2Size(u8),
    #[error("position {position:#x} is not aligned to 2^{log2_size}")]
    MisalignedPosition { position: u64, log2_size: u8 },
    #[error("expected {expected} siblings, got {actual}")]
    SiblingCount { expected: usize, actual: usize },
    #[error("leaf count {0} is not a non-zero power of two")]
    LeafCount(usize),
    #[error("subtree at {position:#x} overlaps a mounted subtree")]
    Overlap { position: u64 },
    #[error("node at {position:#x} lies inside an opaque mounted subtree")]
    OpaqueSubtree { position: u64 },
}

/// Errors produced by the claim state machine and its components. Every error aborts the whole
/// operation; no state is mutated when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("caller {caller:?} is not allowed, expected {expected:?}")]
    Unauthorized { caller: Address, expected: Address },
    #[error("claimer and challenger must be distinct, both are {0:?}")]
    SameParties(Address),

    #[error("operation requires state {expected}, instance is in {actual}")]
    InvalidState { expected: State, actual: State },
    #[error("instance in state {0} cannot be aborted by deadline")]
    NotAbortable(State),

    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
    #[error("no drive is pending")]
    NoPendingDrive,
    #[error("drive {index} does not accept a {expected} submission")]
    WrongDriveKind { index: usize, expected: &'static str },
    #[error("drive {index} has log2 size {log2_size}, literal drives must be {required}")]
    LiteralSize { index: usize, log2_size: u8, required: u8 },
    #[error("drive {index} root {submitted:?} does not match stored root {stored:?}")]
    RootMismatch { index: usize, submitted: H256, stored: H256 },
    #[error("log {root:?} of log2 size {log2_size} is not available")]
    LogUnavailable { root: H256, log2_size: u8 },
    #[error("expected {expected} entries, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("drive {index} does not match the stored position or size")]
    DriveMismatch { index: usize },
    #[error("output proof does not lead to the claimed final hash")]
    InvalidOutputProof,
    #[error("drive {index} slot is not pristine under the current initial hash")]
    InvalidDriveProof { index: usize },
    #[error("drive {index}: {source}")]
    InvalidDrive { index: usize, source: MerkleError },
    #[error("drive {index} overlaps drive {other}")]
    DriveOverlap { index: usize, other: usize },
    #[error("drive {index} waits on a provider but names none")]
    MissingProvider { index: usize },
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("deadline {deadline} has not elapsed, now is {now}")]
    DeadlineNotElapsed { deadline: u64, now: u64 },
    #[error("confirmation deadline {deadline} elapsed at {now}, the claim stands")]
    ConfirmationExpired { deadline: u64, now: u64 },
    #[error("verification game {0} has no verdict yet")]
    VerdictPending(u64),
    #[error("verification game {0} reports both parties as winners")]
    InconsistentVerdict(u64),

    #[error("unrecognized state {0}")]
    UnrecognizedState(String),
}

impl ComputeError {
    /// Returns the [ErrorKind] of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Authorization,
            Self::InvalidState { .. } | Self::NotAbortable(_) => ErrorKind::StateGuard,
            Self::UnknownInstance(_)
            | Self::SameParties(_)
            | Self::NoPendingDrive
            | Self::WrongDriveKind { .. }
            | Self::LiteralSize { .. }
            | Self::RootMismatch { .. }
            | Self::LogUnavailable { .. }
            | Self::CountMismatch { .. }
            | Self::DriveMismatch { .. }
            | Self::InvalidOutputProof
            | Self::InvalidDriveProof { .. }
            | Self::InvalidDrive { .. }
            | Self::DriveOverlap { .. }
            | Self::MissingProvider { .. }
            | Self::Merkle(_)
            | Self::InconsistentVerdict(_) => ErrorKind::DataConsistency,
            Self::DeadlineNotElapsed { .. }
            | Self::ConfirmationExpired { .. }
            | Self::VerdictPending(_) => ErrorKind::Temporal,
            Self::UnrecognizedState(_) => ErrorKind::UnrecognizedState,
        }
    }
}
