//! The collaborators module holds the narrow interfaces of the external services consumed by
//! the [ComputeManager](crate::ComputeManager): the logger, the verification game and a clock.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The [Logger] trait defines the interface of a content-addressed store that can attest the
/// availability of a large content under its Merkle root.
pub trait Logger: Send + Sync {
    /// Returns true if the content committed to by `root`, spanning `2^log2_size` bytes, is
    /// available in the logger.
    fn is_log_available(&self, root: H256, log2_size: u8) -> bool;
}

/// The parameters handed to a [VerificationGame] when a claim is challenged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeParams {
    /// The party disputing the claim.
    pub challenger: Address,
    /// The party defending the claim.
    pub claimer: Address,
    /// The reaction time granted to each party per round, in seconds.
    pub round_duration: u64,
    /// The step machine the game verifies single instructions against.
    pub machine: Address,
    /// The machine root with every drive folded in.
    pub initial_hash: H256,
    /// The machine root the claimer asserts after `final_time` steps.
    pub claimed_final_hash: H256,
    /// The number of steps of the disputed computation.
    pub final_time: u64,
}

/// The [VerificationGame] trait defines the interface of the external bisection game that
/// adjudicates a challenged claim.
pub trait VerificationGame: Send + Sync {
    /// Starts a new game and returns its index.
    fn instantiate(&self, params: ChallengeParams) -> u64;

    /// Returns true if the game at `index` is finished and the challenger won.
    fn is_finished_challenger_won(&self, index: u64) -> bool;

    /// Returns true if the game at `index` is finished and the claimer won.
    fn is_finished_claimer_won(&self, index: u64) -> bool;

    /// Estimates the longest a game can last, in seconds.
    ///
    /// ### Takes
    /// - `round_duration`: The reaction time given to each party per round.
    /// - `start_cost`: The time it takes to start the machine.
    /// - `partition_size`: The number of points per partition round.
    /// - `final_time`: The number of steps of the disputed computation.
    /// - `picoseconds_per_step`: The time it takes to run one step.
    fn max_instance_duration(
        &self,
        round_duration: u64,
        start_cost: u64,
        partition_size: u64,
        final_time: u64,
        picoseconds_per_step: u64,
    ) -> u64;
}

/// The [Clock] trait provides the current time, in seconds, used to stamp moves and check
/// deadlines.
pub trait Clock: Send + Sync {
    /// Returns the current unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// A [Clock] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}
