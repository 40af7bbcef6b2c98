//! The instance module holds the [Instance] record of a claim negotiation and its [State].

use crate::{drive::DriveCommitments, error::ComputeError, InstanceId};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The [State] enum defines the phases of a claim negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum State {
    WaitingProviders = 0,
    ProviderMissedDeadline = 1,
    WaitingClaim = 2,
    ClaimerMissedDeadline = 3,
    WaitingConfirmation = 4,
    ConsensusResult = 5,
    WaitingChallenge = 6,
    ChallengerWon = 7,
    ClaimerWon = 8,
}

impl State {
    /// Every state, in declaration order.
    pub const ALL: [State; 9] = [
        State::WaitingProviders,
        State::ProviderMissedDeadline,
        State::WaitingClaim,
        State::ClaimerMissedDeadline,
        State::WaitingConfirmation,
        State::ConsensusResult,
        State::WaitingChallenge,
        State::ChallengerWon,
        State::ClaimerWon,
    ];

    /// Returns the label of the state.
    pub fn label(&self) -> &'static str {
        match self {
            State::WaitingProviders => "WaitingProviders",
            State::ProviderMissedDeadline => "ProviderMissedDeadline",
            State::WaitingClaim => "WaitingClaim",
            State::ClaimerMissedDeadline => "ClaimerMissedDeadline",
            State::WaitingConfirmation => "WaitingConfirmation",
            State::ConsensusResult => "ConsensusResult",
            State::WaitingChallenge => "WaitingChallenge",
            State::ChallengerWon => "ChallengerWon",
            State::ClaimerWon => "ClaimerWon",
        }
    }

    /// Returns true if no operation can move the instance out of this state.
    pub fn is_terminal(&self) -> bool {
        match self {
            State::WaitingProviders
            | State::WaitingClaim
            | State::WaitingConfirmation
            | State::WaitingChallenge => false,
            State::ProviderMissedDeadline
            | State::ClaimerMissedDeadline
            | State::ConsensusResult
            | State::ChallengerWon
            | State::ClaimerWon => true,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for State {
    type Error = ComputeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        State::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ComputeError::UnrecognizedState(value.to_string()))
    }
}

impl FromStr for State {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.label() == s)
            .ok_or_else(|| ComputeError::UnrecognizedState(s.to_string()))
    }
}

/// The [Instance] struct holds the full record of one claim negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// The identifier of the instance in the registry.
    pub id: InstanceId,
    /// The maximum number of steps the computation may run.
    pub final_time: u64,
    /// The address of the 32-byte output in the final machine.
    pub output_position: u64,
    /// The reaction time given to each party, in seconds.
    pub round_duration: u64,
    /// The timestamp of the last state-advancing move.
    pub time_of_last_move: u64,
    /// The hash of the machine before any drive is mounted.
    pub template_hash: H256,
    /// The hash of the machine with its drives folded in; equals `template_hash` until a claim
    /// is submitted.
    pub initial_hash: H256,
    pub claimed_final_hash: Option<H256>,
    pub claimed_output: Option<H256>,
    pub claimer: Address,
    pub challenger: Address,
    pub state: State,
    pub drives: DriveCommitments,
    /// The index of the verification game started by a challenge.
    pub vg_instance: Option<u64>,
}

impl Instance {
    /// Returns true if `address` is one of the two parties of the instance.
    pub fn is_concerned(&self, address: Address) -> bool {
        self.claimer == address || self.challenger == address
    }

    pub(crate) fn require_state(&self, expected: State) -> Result<(), ComputeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ComputeError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    pub(crate) fn require_sender(
        &self,
        caller: Address,
        expected: Address,
    ) -> Result<(), ComputeError> {
        if caller == expected {
            Ok(())
        } else {
            Err(ComputeError::Unauthorized { caller, expected })
        }
    }
}
