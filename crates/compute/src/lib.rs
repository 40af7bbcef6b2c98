//! Claim, challenge and escalation logic for off-chain computations.
//!
//! Two parties, a claimer and a challenger, negotiate the result of a computation through an
//! [Instance]. The claimer commits to the final machine hash and to the output, proven against
//! Merkle roots; the challenger either confirms the claim or escalates it to an external
//! [VerificationGame]. Input drives are resolved to content hashes first, possibly waiting for
//! their providers and the [Logger]. Every waiting phase is bounded by the [DeadlineConfig]
//! policy.
//!
//! The [ComputeManager] is a single-writer registry: every operation takes `&mut self`, checks
//! all of its preconditions, and only then mutates one instance.

/// The identifier of an [Instance] within a [ComputeManager].
pub type InstanceId = u64;

mod error;
pub use error::{ComputeError, ErrorKind, MerkleError, Result};

pub mod merkle;

mod collaborators;
pub use collaborators::{ChallengeParams, Clock, Logger, SystemClock, VerificationGame};

mod drive;
pub use drive::{Drive, DriveCommitments, Resolution};

mod instance;
pub use instance::{Instance, State};

mod deadline;
pub use deadline::DeadlineConfig;

mod escalation;
pub use escalation::{Escalation, SubInstance, Verdict};

mod claim;
pub use claim::Claim;

mod types;
pub use types::{ComputeResult, Event, InstanceView};

mod manager;
pub use manager::{ComputeManager, InstanceParams, ManagerConfig};

pub mod stubs;
