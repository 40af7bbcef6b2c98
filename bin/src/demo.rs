//! A scripted negotiation against the in-memory collaborators.

use anyhow::Result;
use arbiter_compute::{
    merkle::{self, SparseTree},
    stubs::{ManualClock, MemoryGame, MemoryLogger},
    Claim, Clock, ComputeManager, ComputeResult, DeadlineConfig, Drive, InstanceParams,
    InstanceView, ManagerConfig, SystemClock, Verdict,
};
use arbiter_driver::{DeadlineKeeperDriver, Driver, DriverConfig, EventDispatchDriver};
use clap::ValueEnum;
use ethers::{
    types::{Address, H256},
    utils::keccak256,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

const ROM_POSITION: u64 = 0x1000;
const ROM_LOG2_SIZE: u8 = 12;
const INPUT_POSITION: u64 = 1 << 63;
const PROVIDED_POSITION: u64 = INPUT_POSITION + 0x20;
const LOG_POSITION: u64 = 0xa000_0000;
const LOG_LOG2_SIZE: u8 = 20;
const RAM_POSITION: u64 = 0x8000_0000;
const RAM_LOG2_SIZE: u8 = 24;
const OUTPUT_POSITION: u64 = 0xb000_0000;

/// How the scripted negotiation ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Outcome {
    /// The challenger confirms the claim.
    Consensus,
    /// The challenger disputes the claim and wins the game.
    ChallengerWon,
    /// The challenger disputes the claim and loses the game.
    ClaimerWon,
    /// The claimer never submits and the keeper aborts the instance.
    ClaimerTimeout,
}

/// Runs a negotiation with one immediate literal drive, one provided literal drive and one
/// logged drive, then lets the keeper drivers settle it.
pub async fn run(
    outcome: Outcome,
    deadlines: DeadlineConfig,
    poll_interval: Duration,
) -> Result<(InstanceView, ComputeResult)> {
    let claimer = Address::repeat_byte(0xc1);
    let challenger = Address::repeat_byte(0xc2);
    let provider = Address::repeat_byte(0xd0);

    let logger = Arc::new(MemoryLogger::default());
    let game = Arc::new(MemoryGame::default());
    let clock = Arc::new(ManualClock::new(SystemClock.now()));

    let log_root = H256::from(keccak256(b"logged drive"));
    logger.publish(log_root, LOG_LOG2_SIZE);

    let mut template = SparseTree::new();
    template.mount(ROM_POSITION, ROM_LOG2_SIZE, H256::from(keccak256(b"rom")))?;

    let drives = vec![
        Drive {
            position: INPUT_POSITION,
            log2_size: merkle::LOG2_LITERAL_SIZE,
            direct_value: H256::from_low_u64_be(42),
            ..Default::default()
        },
        Drive {
            position: PROVIDED_POSITION,
            log2_size: merkle::LOG2_LITERAL_SIZE,
            provider,
            needs_provider: true,
            ..Default::default()
        },
        Drive {
            position: LOG_POSITION,
            log2_size: LOG_LOG2_SIZE,
            logger_root: log_root,
            needs_logger: true,
            ..Default::default()
        },
    ];

    let mut manager = ComputeManager::new(
        ManagerConfig {
            machine: Address::repeat_byte(0x5e),
            verification_game: Address::repeat_byte(0x76),
            deadlines,
        },
        logger,
        game.clone(),
        clock.clone(),
    );

    let id = manager.instantiate(InstanceParams {
        final_time: 1_000_000,
        template_hash: template.root()?,
        output_position: OUTPUT_POSITION,
        round_duration: 45,
        claimer,
        challenger,
        drives: drives.clone(),
    })?;
    manager.claim_direct_drive(id, provider, H256::from_low_u64_be(7))?;

    if outcome == Outcome::ClaimerTimeout {
        let duration = manager.max_state_duration(id)?;
        tracing::info!(target: "arbiter-cli", "Skipping the claim, moving the clock {} seconds ahead", duration + 1);
        clock.advance(duration + 1);
    } else {
        let hashes = manager.instance(id)?.drives.hashes().to_vec();
        let mut final_machine = template.clone();
        for (drive, hash) in drives.iter().zip(&hashes) {
            final_machine.mount(drive.position, drive.log2_size, *hash)?;
        }
        final_machine.mount(RAM_POSITION, RAM_LOG2_SIZE, H256::from(keccak256(b"ram")))?;

        let output = H256::from_low_u64_be(49);
        let claim = Claim::build(
            &template,
            &drives,
            &hashes,
            &final_machine,
            OUTPUT_POSITION,
            output,
        )?;
        manager.submit_claim(id, claimer, &claim)?;

        match outcome {
            Outcome::Consensus => manager.confirm(id, challenger)?,
            Outcome::ChallengerWon | Outcome::ClaimerWon => {
                manager.challenge(id, challenger)?;
                let verdict = if outcome == Outcome::ChallengerWon {
                    Verdict::ChallengerWon
                } else {
                    Verdict::ClaimerWon
                };
                let sub_instances = manager.get_sub_instances(id)?;
                for sub in sub_instances {
                    game.settle(sub.index, verdict);
                }
            }
            Outcome::ClaimerTimeout => {}
        }
    }

    let manager = Arc::new(Mutex::new(manager));
    let config = Arc::new(DriverConfig::new(
        Arc::clone(&manager),
        poll_interval,
        true,
    ));

    tokio::try_join!(
        DeadlineKeeperDriver::new(Arc::clone(&config)).start_loop(),
        EventDispatchDriver::new(Arc::clone(&config)).start_loop(),
    )?;

    let manager = manager.lock().await;
    Ok((manager.get_state(id)?, manager.get_result(id)?))
}
