//! The types module contains the events and read-only views exposed by the
//! [ComputeManager](crate::ComputeManager).

use crate::{Drive, InstanceId, State};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// An [Event] is emitted on every transition of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// A new instance was registered.
    #[serde(rename_all = "camelCase")]
    Created {
        id: InstanceId,
        claimer: Address,
        challenger: Address,
        state: State,
    },
    /// A pending drive was resolved by its provider.
    #[serde(rename_all = "camelCase")]
    DriveResolved {
        id: InstanceId,
        index: usize,
        hash: H256,
    },
    /// The claimer submitted its final hash and output.
    #[serde(rename_all = "camelCase")]
    ClaimSubmitted {
        id: InstanceId,
        final_hash: H256,
        output: H256,
    },
    /// The challenger agreed with the claim.
    #[serde(rename_all = "camelCase")]
    ResultConfirmed { id: InstanceId },
    /// The challenger disputed the claim and a verification game was started.
    #[serde(rename_all = "camelCase")]
    ChallengeStarted { id: InstanceId, game_index: u64 },
    /// The instance reached a terminal state.
    #[serde(rename_all = "camelCase")]
    Finished { id: InstanceId, state: State },
}

impl Event {
    /// Returns the instance the event refers to.
    pub fn id(&self) -> InstanceId {
        match self {
            Event::Created { id, .. }
            | Event::DriveResolved { id, .. }
            | Event::ClaimSubmitted { id, .. }
            | Event::ResultConfirmed { id }
            | Event::ChallengeStarted { id, .. }
            | Event::Finished { id, .. } => *id,
        }
    }
}

/// The outcome of an instance as reported by
/// [ComputeManager::get_result](crate::ComputeManager::get_result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResult {
    /// An output is available and accepted.
    pub ready: bool,
    /// The negotiation is still in progress.
    pub running: bool,
    /// The party that lost or missed a deadline.
    pub blame: Option<Address>,
    /// The accepted output, when `ready`.
    pub output: Option<H256>,
}

impl ComputeResult {
    pub(crate) fn running() -> Self {
        Self {
            ready: false,
            running: true,
            blame: None,
            output: None,
        }
    }

    pub(crate) fn blamed(party: Address) -> Self {
        Self {
            ready: false,
            running: false,
            blame: Some(party),
            output: None,
        }
    }
}

/// A serializable snapshot of an instance, returned by
/// [ComputeManager::get_state](crate::ComputeManager::get_state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    /// The identifier of the instance.
    pub id: InstanceId,
    /// The number of steps the machine runs for.
    pub final_time: u64,
    /// The address the output is read from.
    pub output_position: u64,
    /// The reaction time granted to a party, in seconds.
    pub round_duration: u64,
    /// The timestamp of the last state change or drive resolution.
    pub time_of_last_move: u64,
    /// The timestamp after which the current state expires.
    pub deadline: u64,
    /// The machine root before any drive is mounted.
    pub template_hash: H256,
    /// The machine root with the drives folded in so far.
    pub initial_hash: H256,
    /// The final hash asserted by the claimer, once submitted.
    pub claimed_final_hash: Option<H256>,
    /// The output asserted by the claimer, once submitted.
    pub claimed_output: Option<H256>,
    /// The party submitting the result.
    pub claimer: Address,
    /// The party checking the result.
    pub challenger: Address,
    /// The current lifecycle state.
    pub current_state: State,
    /// The drives, with provider submissions filled in.
    pub drives: Vec<Drive>,
    /// The resolved hash of every drive; zero while unresolved.
    pub drive_hashes: Vec<H256>,
    /// The indices of the drives waiting on a provider, in order.
    pub pending_drives: Vec<usize>,
    /// The next entry of `pending_drives` to be resolved.
    pub pending_drives_pointer: usize,
    /// The index of the verification game, once challenged.
    pub vg_instance: Option<u64>,
}
