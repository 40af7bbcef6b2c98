//! In-memory implementations of the collaborator traits, used by tests and by the CLI demo.

use crate::{escalation::Verdict, ChallengeParams, Clock, Logger, VerificationGame};
use ethers::types::H256;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

/// A [Logger] that knows the logs explicitly published to it.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    logs: Mutex<HashSet<(H256, u8)>>,
}

impl MemoryLogger {
    /// Makes the log with `root` and `log2_size` available.
    pub fn publish(&self, root: H256, log2_size: u8) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((root, log2_size));
    }
}

impl Logger for MemoryLogger {
    fn is_log_available(&self, root: H256, log2_size: u8) -> bool {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(root, log2_size))
    }
}

#[derive(Debug, Clone, Copy)]
struct GameRecord {
    params: ChallengeParams,
    challenger_won: bool,
    claimer_won: bool,
}

/// A [VerificationGame] whose outcomes are settled by hand.
#[derive(Debug, Default)]
pub struct MemoryGame {
    games: Mutex<Vec<GameRecord>>,
}

impl MemoryGame {
    /// Finishes the game at `index` with `verdict`.
    pub fn settle(&self, index: u64, verdict: Verdict) {
        match verdict {
            Verdict::ChallengerWon => self.force_outcome(index, true, false),
            Verdict::ClaimerWon => self.force_outcome(index, false, true),
        }
    }

    /// Sets both terminal predicates of the game at `index`.
    pub fn force_outcome(&self, index: u64, challenger_won: bool, claimer_won: bool) {
        if let Some(game) = self.games().get_mut(index as usize) {
            game.challenger_won = challenger_won;
            game.claimer_won = claimer_won;
        }
    }

    /// Returns the parameters the game at `index` was started with.
    pub fn params(&self, index: u64) -> Option<ChallengeParams> {
        self.games().get(index as usize).map(|g| g.params)
    }

    /// Returns the number of games started so far.
    pub fn len(&self) -> usize {
        self.games().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn outcome(&self, index: u64) -> (bool, bool) {
        self.games()
            .get(index as usize)
            .map_or((false, false), |g| (g.challenger_won, g.claimer_won))
    }

    /// Locks the records, ignoring poisoning.
    fn games(&self) -> MutexGuard<'_, Vec<GameRecord>> {
        self.games.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VerificationGame for MemoryGame {
    fn instantiate(&self, params: ChallengeParams) -> u64 {
        let mut games = self.games();
        games.push(GameRecord {
            params,
            challenger_won: false,
            claimer_won: false,
        });
        games.len() as u64 - 1
    }

    fn is_finished_challenger_won(&self, index: u64) -> bool {
        self.outcome(index).0
    }

    fn is_finished_claimer_won(&self, index: u64) -> bool {
        self.outcome(index).1
    }

    /// One partition round per power of `partition_size` covering `final_time`, each giving both
    /// parties a round and a full run of the machine.
    fn max_instance_duration(
        &self,
        round_duration: u64,
        start_cost: u64,
        partition_size: u64,
        final_time: u64,
        picoseconds_per_step: u64,
    ) -> u64 {
        let run_time = (final_time as u128 * picoseconds_per_step as u128 / 1_000_000_000_000)
            .min(u64::MAX as u128) as u64;
        let base = partition_size.max(2) as u128;
        let (mut rounds, mut covered) = (1u64, base);
        while covered < final_time as u128 {
            covered *= base;
            rounds += 1;
        }
        let per_round = round_duration
            .saturating_mul(2)
            .saturating_add(run_time);
        start_cost.saturating_add(rounds.saturating_mul(per_round))
    }
}

/// A [Clock] that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
