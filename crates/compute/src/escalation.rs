//! The escalation module adapts a challenged [Instance] to the external [VerificationGame] and
//! interprets the game's terminal verdict.

use crate::{
    error::{ComputeError, Result},
    ChallengeParams, Instance, State, VerificationGame,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The terminal verdict of a verification game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    ChallengerWon,
    ClaimerWon,
}

impl Verdict {
    /// Returns the terminal [State] an instance adopts for this verdict.
    pub fn state(&self) -> State {
        match self {
            Verdict::ChallengerWon => State::ChallengerWon,
            Verdict::ClaimerWon => State::ClaimerWon,
        }
    }
}

/// A reference to a game delegated to the verification game service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubInstance {
    /// The address of the verification game service.
    pub game: Address,
    /// The index of the game within the service.
    pub index: u64,
}

/// The [Escalation] struct delegates challenged claims to a [VerificationGame].
#[derive(Clone)]
pub struct Escalation {
    game: Arc<dyn VerificationGame>,
    /// The address of the verification game service.
    address: Address,
    /// The step machine games are played against.
    machine: Address,
}

impl Escalation {
    pub fn new(game: Arc<dyn VerificationGame>, address: Address, machine: Address) -> Self {
        Self {
            game,
            address,
            machine,
        }
    }

    /// Returns the underlying [VerificationGame].
    pub fn game(&self) -> &dyn VerificationGame {
        self.game.as_ref()
    }

    /// Starts a game for the claim of `instance` and returns its index.
    pub fn start(&self, instance: &Instance) -> Result<u64> {
        let claimed_final_hash = instance
            .claimed_final_hash
            .ok_or(ComputeError::InvalidState {
                expected: State::WaitingConfirmation,
                actual: instance.state,
            })?;

        let index = self.game.instantiate(ChallengeParams {
            challenger: instance.challenger,
            claimer: instance.claimer,
            round_duration: instance.round_duration,
            machine: self.machine,
            initial_hash: instance.initial_hash,
            claimed_final_hash,
            final_time: instance.final_time,
        });
        tracing::debug!(target: "compute", "Instance {} escalated to verification game {}", instance.id, index);
        Ok(index)
    }

    /// Returns the verdict of the game at `index`. Exactly one party must have won.
    pub fn verdict(&self, index: u64) -> Result<Verdict> {
        match (
            self.game.is_finished_challenger_won(index),
            self.game.is_finished_claimer_won(index),
        ) {
            (true, false) => Ok(Verdict::ChallengerWon),
            (false, true) => Ok(Verdict::ClaimerWon),
            (false, false) => Err(ComputeError::VerdictPending(index)),
            (true, true) => Err(ComputeError::InconsistentVerdict(index)),
        }
    }

    /// Returns the [SubInstance] reference of the game at `index`.
    pub fn sub_instance(&self, index: u64) -> SubInstance {
        SubInstance {
            game: self.address,
            index,
        }
    }
}

impl std::fmt::Debug for Escalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Escalation")
            .field("address", &self.address)
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}
