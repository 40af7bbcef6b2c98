//! The deadline module holds the [DeadlineConfig] policy that bounds how long an instance may
//! stay in each of its waiting states.

use crate::{Instance, State, VerificationGame};
use serde::{Deserialize, Serialize};

/// Picoseconds per second.
const PICOSECONDS: u128 = 1_000_000_000_000;

/// The [DeadlineConfig] struct holds the fixed costs the deadline of each state is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeadlineConfig {
    /// Seconds it takes to start the machine for the first time.
    pub start_cost: u64,
    /// Seconds granted to providers to upload and assemble their drives.
    pub max_upload_time: u64,
    /// Picoseconds it takes to run a single step.
    pub picoseconds_per_step: u64,
    /// Points per partition round of the verification game.
    pub partition_size: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            start_cost: 40,
            max_upload_time: 40 * 60,
            picoseconds_per_step: 500,
            partition_size: 10,
        }
    }
}

impl DeadlineConfig {
    /// Returns the seconds it takes to run `final_time` steps.
    pub fn run_time(&self, final_time: u64) -> u64 {
        let picoseconds = final_time as u128 * self.picoseconds_per_step as u128;
        u64::try_from(picoseconds / PICOSECONDS).unwrap_or(u64::MAX)
    }

    /// Returns the maximum number of seconds an instance may remain in `state`.
    ///
    /// ### Takes
    /// - `state`: The state to compute the duration of.
    /// - `final_time`: The maximum step count of the computation.
    /// - `round_duration`: The reaction time given to each party.
    /// - `game`: The verification game, consulted only for [State::WaitingChallenge].
    pub fn max_duration(
        &self,
        state: State,
        final_time: u64,
        round_duration: u64,
        game: &dyn VerificationGame,
    ) -> u64 {
        match state {
            State::WaitingProviders => self
                .start_cost
                .saturating_add(self.max_upload_time)
                .saturating_add(round_duration),
            State::WaitingClaim | State::WaitingConfirmation => self
                .start_cost
                .saturating_add(self.run_time(final_time))
                .saturating_add(round_duration),
            State::WaitingChallenge => game
                .max_instance_duration(
                    round_duration,
                    self.start_cost,
                    self.partition_size,
                    final_time,
                    self.picoseconds_per_step,
                )
                .saturating_add(round_duration),
            State::ProviderMissedDeadline
            | State::ClaimerMissedDeadline
            | State::ConsensusResult
            | State::ChallengerWon
            | State::ClaimerWon => 0,
        }
    }

    /// Returns the timestamp after which the current state of `instance` has expired.
    pub fn deadline(&self, instance: &Instance, game: &dyn VerificationGame) -> u64 {
        instance.time_of_last_move.saturating_add(self.max_duration(
            instance.state,
            instance.final_time,
            instance.round_duration,
            game,
        ))
    }

    /// Returns true if `now` is strictly past the deadline of the current state of `instance`.
    pub fn is_expired(&self, instance: &Instance, game: &dyn VerificationGame, now: u64) -> bool {
        now > self.deadline(instance, game)
    }
}
