//! The manager module holds the [ComputeManager], the registry of claim negotiations and the
//! state machine that advances them.

use crate::{
    deadline::DeadlineConfig,
    drive::DriveCommitments,
    error::{ComputeError, Result},
    escalation::{Escalation, SubInstance},
    merkle::{self, LOG2_LITERAL_SIZE},
    types::{ComputeResult, Event, InstanceView},
    Claim, Clock, Drive, Instance, InstanceId, Logger, State, VerificationGame,
};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The [ManagerConfig] struct holds the static configuration shared by every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// The step machine verification games are played against.
    pub machine: Address,
    /// The address of the verification game service.
    pub verification_game: Address,
    /// The deadline policy.
    pub deadlines: DeadlineConfig,
}

/// The parameters of a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceParams {
    /// The number of steps the machine runs for.
    pub final_time: u64,
    /// The root of the machine before any drive is mounted.
    pub template_hash: H256,
    /// The address the 32-byte output is read from.
    pub output_position: u64,
    /// The reaction time granted to a party, in seconds.
    pub round_duration: u64,
    /// The party submitting the result.
    pub claimer: Address,
    /// The party checking the result.
    pub challenger: Address,
    /// The input drives, in the order they are folded into the machine.
    pub drives: Vec<Drive>,
}

/// The [ComputeManager] owns every [Instance] and the collaborators they are checked against.
///
/// Every operation validates all of its preconditions before mutating anything, so a returned
/// error always leaves the registry untouched.
pub struct ComputeManager {
    config: ManagerConfig,
    /// Instances indexed by their identifier.
    instances: Vec<Instance>,
    logger: Arc<dyn Logger>,
    escalation: Escalation,
    clock: Arc<dyn Clock>,
    /// Events emitted since the last [ComputeManager::drain_events] call.
    events: Vec<Event>,
}

impl ComputeManager {
    /// Creates an empty [ComputeManager].
    pub fn new(
        config: ManagerConfig,
        logger: Arc<dyn Logger>,
        game: Arc<dyn VerificationGame>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let escalation = Escalation::new(game, config.verification_game, config.machine);
        Self {
            config,
            instances: Vec::new(),
            logger,
            escalation,
            clock,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registers a new instance and resolves every drive that does not need a provider.
    ///
    /// ### Returns
    /// - `Ok(InstanceId)`: The identifier of the new instance.
    /// - `Err(ComputeError)`: The parties are the same address, or a drive is malformed.
    pub fn instantiate(&mut self, params: InstanceParams) -> Result<InstanceId> {
        if params.claimer == params.challenger {
            return Err(ComputeError::SameParties(params.claimer));
        }

        let drives = DriveCommitments::resolve(params.drives, self.logger.as_ref())?;
        let state = if drives.all_resolved() {
            State::WaitingClaim
        } else {
            State::WaitingProviders
        };

        let id = self.instances.len() as InstanceId;
        self.instances.push(Instance {
            id,
            final_time: params.final_time,
            output_position: params.output_position,
            round_duration: params.round_duration,
            time_of_last_move: self.clock.now(),
            template_hash: params.template_hash,
            initial_hash: params.template_hash,
            claimed_final_hash: None,
            claimed_output: None,
            claimer: params.claimer,
            challenger: params.challenger,
            state,
            drives,
            vg_instance: None,
        });

        tracing::info!(target: "compute", "Instance {} created in state {}", id, state);
        self.events.push(Event::Created {
            id,
            claimer: params.claimer,
            challenger: params.challenger,
            state,
        });
        Ok(id)
    }

    /// Resolves the next pending drive of instance `id` with a literal value.
    pub fn claim_direct_drive(
        &mut self,
        id: InstanceId,
        sender: Address,
        value: H256,
    ) -> Result<()> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_state(State::WaitingProviders)?;
        let (index, hash) = instance.drives.claim_direct(sender, value)?;

        let event = drive_resolved(instance, index, hash, now);
        self.events.push(event);
        Ok(())
    }

    /// Resolves the next pending drive of instance `id` with a root available in the logger.
    pub fn claim_logger_drive(
        &mut self,
        id: InstanceId,
        sender: Address,
        root: H256,
    ) -> Result<()> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_state(State::WaitingProviders)?;
        let (index, hash) = instance
            .drives
            .claim_logger(sender, root, self.logger.as_ref())?;

        let event = drive_resolved(instance, index, hash, now);
        self.events.push(event);
        Ok(())
    }

    /// Submits the claimer's final hash and output for instance `id`.
    ///
    /// The output must be proven against the claimed final hash, and every drive must be proven
    /// to sit in a pristine slot of the initial hash as folded so far. The resolved drive hashes
    /// are folded in with the same proofs, in drive order.
    pub fn submit_claim(&mut self, id: InstanceId, sender: Address, claim: &Claim) -> Result<()> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_sender(sender, instance.claimer)?;
        instance.require_state(State::WaitingClaim)?;
        let initial_hash = verify_claim(instance, claim)?;

        instance.initial_hash = initial_hash;
        instance.claimed_final_hash = Some(claim.final_hash);
        instance.claimed_output = Some(claim.output);
        instance.state = State::WaitingConfirmation;
        instance.time_of_last_move = now;

        tracing::info!(target: "compute", "Claim submitted to instance {}: final hash {:?}", id, claim.final_hash);
        self.events.push(Event::ClaimSubmitted {
            id,
            final_hash: claim.final_hash,
            output: claim.output,
        });
        Ok(())
    }

    /// Accepts the claim of instance `id`. Refused once the confirmation deadline elapsed, as
    /// the claim already stands.
    pub fn confirm(&mut self, id: InstanceId, sender: Address) -> Result<()> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_sender(sender, instance.challenger)?;
        instance.require_state(State::WaitingConfirmation)?;
        let deadline = self
            .config
            .deadlines
            .deadline(instance, self.escalation.game());
        if now > deadline {
            return Err(ComputeError::ConfirmationExpired { deadline, now });
        }

        instance.state = State::ConsensusResult;
        instance.time_of_last_move = now;

        tracing::info!(target: "compute", "Instance {} confirmed by the challenger", id);
        self.events.push(Event::ResultConfirmed { id });
        self.events.push(Event::Finished {
            id,
            state: State::ConsensusResult,
        });
        Ok(())
    }

    /// Disputes the claim of instance `id`, escalating it to a verification game. Only allowed
    /// before the confirmation deadline.
    pub fn challenge(&mut self, id: InstanceId, sender: Address) -> Result<()> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_sender(sender, instance.challenger)?;
        instance.require_state(State::WaitingConfirmation)?;
        let deadline = self
            .config
            .deadlines
            .deadline(instance, self.escalation.game());
        if now > deadline {
            return Err(ComputeError::ConfirmationExpired { deadline, now });
        }
        let game_index = self.escalation.start(instance)?;

        instance.vg_instance = Some(game_index);
        instance.state = State::WaitingChallenge;
        instance.time_of_last_move = now;

        tracing::info!(target: "compute", "Instance {} challenged, verification game {}", id, game_index);
        self.events.push(Event::ChallengeStarted { id, game_index });
        Ok(())
    }

    /// Adopts the verdict of the verification game of instance `id`. Callable by anyone.
    pub fn win_by_vg(&mut self, id: InstanceId) -> Result<State> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        instance.require_state(State::WaitingChallenge)?;
        let game_index = instance.vg_instance.ok_or_else(|| {
            ComputeError::UnrecognizedState("WaitingChallenge without a game".to_string())
        })?;
        let state = self.escalation.verdict(game_index)?.state();

        instance.state = state;
        instance.time_of_last_move = now;

        tracing::info!(target: "compute", "Instance {} settled by verification game {}: {}", id, game_index, state);
        self.events.push(Event::Finished { id, state });
        Ok(state)
    }

    /// Ends instance `id` because the party it was waiting on missed its deadline. Only the
    /// provider and claim phases can be aborted. Callable by anyone.
    pub fn abort_by_deadline(&mut self, id: InstanceId) -> Result<State> {
        let now = self.clock.now();
        let instance = lookup_mut(&mut self.instances, id)?;
        let state = match instance.state {
            State::WaitingProviders => State::ProviderMissedDeadline,
            State::WaitingClaim => State::ClaimerMissedDeadline,
            State::WaitingConfirmation
            | State::WaitingChallenge
            | State::ProviderMissedDeadline
            | State::ClaimerMissedDeadline
            | State::ConsensusResult
            | State::ChallengerWon
            | State::ClaimerWon => return Err(ComputeError::NotAbortable(instance.state)),
        };
        let deadline = self
            .config
            .deadlines
            .deadline(instance, self.escalation.game());
        if now <= deadline {
            return Err(ComputeError::DeadlineNotElapsed { deadline, now });
        }

        instance.state = state;
        instance.time_of_last_move = now;

        tracing::warn!(target: "compute", "Instance {} aborted at {}: {}", id, now, state);
        self.events.push(Event::Finished { id, state });
        Ok(state)
    }

    /// Returns the [Instance] record with identifier `id`.
    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(id as usize)
            .ok_or(ComputeError::UnknownInstance(id))
    }

    /// Returns the number of instances ever created.
    pub fn instance_count(&self) -> u64 {
        self.instances.len() as u64
    }

    /// Returns a serializable snapshot of instance `id`.
    pub fn get_state(&self, id: InstanceId) -> Result<InstanceView> {
        let instance = self.instance(id)?;
        Ok(InstanceView {
            id,
            final_time: instance.final_time,
            output_position: instance.output_position,
            round_duration: instance.round_duration,
            time_of_last_move: instance.time_of_last_move,
            deadline: self.deadline(instance),
            template_hash: instance.template_hash,
            initial_hash: instance.initial_hash,
            claimed_final_hash: instance.claimed_final_hash,
            claimed_output: instance.claimed_output,
            claimer: instance.claimer,
            challenger: instance.challenger,
            current_state: instance.state,
            drives: instance.drives.drives().to_vec(),
            drive_hashes: instance.drives.hashes().to_vec(),
            pending_drives: instance.drives.pending().to_vec(),
            pending_drives_pointer: instance.drives.cursor(),
            vg_instance: instance.vg_instance,
        })
    }

    /// Returns the label of the current state of instance `id`.
    pub fn get_current_state(&self, id: InstanceId) -> Result<&'static str> {
        Ok(self.instance(id)?.state.label())
    }

    /// Returns the verification game instance `id` is waiting on, if any.
    pub fn get_sub_instances(&self, id: InstanceId) -> Result<Vec<SubInstance>> {
        let instance = self.instance(id)?;
        match instance.state {
            State::WaitingChallenge => Ok(instance
                .vg_instance
                .map(|index| self.escalation.sub_instance(index))
                .into_iter()
                .collect()),
            State::WaitingProviders
            | State::ProviderMissedDeadline
            | State::WaitingClaim
            | State::ClaimerMissedDeadline
            | State::WaitingConfirmation
            | State::ConsensusResult
            | State::ChallengerWon
            | State::ClaimerWon => Ok(Vec::new()),
        }
    }

    /// Returns the outcome of instance `id`.
    ///
    /// A claim left unconfirmed past its deadline is reported as accepted: the challenger had
    /// its chance to dispute it.
    pub fn get_result(&self, id: InstanceId) -> Result<ComputeResult> {
        let instance = self.instance(id)?;
        let accepted = ComputeResult {
            ready: true,
            running: false,
            blame: None,
            output: instance.claimed_output,
        };

        Ok(match instance.state {
            State::WaitingProviders | State::WaitingClaim | State::WaitingChallenge => {
                ComputeResult::running()
            }
            State::WaitingConfirmation => {
                if self.deadline_expired(instance) {
                    accepted
                } else {
                    ComputeResult::running()
                }
            }
            State::ConsensusResult => accepted,
            State::ProviderMissedDeadline => {
                let (_, drive) = instance.drives.current().ok_or_else(|| {
                    ComputeError::UnrecognizedState(
                        "ProviderMissedDeadline without a pending drive".to_string(),
                    )
                })?;
                ComputeResult::blamed(drive.provider)
            }
            State::ClaimerMissedDeadline | State::ChallengerWon => {
                ComputeResult::blamed(instance.claimer)
            }
            State::ClaimerWon => ComputeResult {
                blame: Some(instance.challenger),
                ..accepted
            },
        })
    }

    /// Returns true if `address` is the claimer or the challenger of instance `id`.
    pub fn is_concerned(&self, id: InstanceId, address: Address) -> Result<bool> {
        Ok(self.instance(id)?.is_concerned(address))
    }

    /// Returns true if the outcome of instance `id` can still change: it is not in a terminal
    /// state, and it is not a claim left unconfirmed past its deadline.
    pub fn is_active(&self, id: InstanceId) -> Result<bool> {
        let instance = self.instance(id)?;
        Ok(match instance.state {
            State::WaitingConfirmation => !self.deadline_expired(instance),
            state => !state.is_terminal(),
        })
    }

    /// Returns the maximum number of seconds instance `id` may remain in its current state.
    pub fn max_state_duration(&self, id: InstanceId) -> Result<u64> {
        let instance = self.instance(id)?;
        Ok(self.config.deadlines.max_duration(
            instance.state,
            instance.final_time,
            instance.round_duration,
            self.escalation.game(),
        ))
    }

    /// Returns true if the current state of instance `id` is past its deadline.
    pub fn deadline_elapsed(&self, id: InstanceId) -> Result<bool> {
        Ok(self.deadline_expired(self.instance(id)?))
    }

    /// Takes every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn deadline(&self, instance: &Instance) -> u64 {
        self.config
            .deadlines
            .deadline(instance, self.escalation.game())
    }

    fn deadline_expired(&self, instance: &Instance) -> bool {
        self.config
            .deadlines
            .is_expired(instance, self.escalation.game(), self.clock.now())
    }
}

fn lookup_mut(instances: &mut [Instance], id: InstanceId) -> Result<&mut Instance> {
    instances
        .get_mut(id as usize)
        .ok_or(ComputeError::UnknownInstance(id))
}

/// Records a resolved drive and moves the instance on once no drive is pending.
fn drive_resolved(instance: &mut Instance, index: usize, hash: H256, now: u64) -> Event {
    instance.time_of_last_move = now;
    tracing::debug!(target: "compute", "Instance {} drive {} resolved to {:?}", instance.id, index, hash);
    if instance.drives.all_resolved() {
        instance.state = State::WaitingClaim;
        tracing::info!(target: "compute", "Instance {} has every drive, waiting for the claim", instance.id);
    }
    Event::DriveResolved {
        id: instance.id,
        index,
        hash,
    }
}

/// Checks every proof of `claim` against `instance` and returns the folded initial hash.
fn verify_claim(instance: &Instance, claim: &Claim) -> Result<H256> {
    let stored = instance.drives.drives();
    for actual in [claim.drives.len(), claim.drive_siblings.len()] {
        if actual != stored.len() {
            return Err(ComputeError::CountMismatch {
                expected: stored.len(),
                actual,
            });
        }
    }
    if let Some(index) = stored.iter().zip(&claim.drives).position(|(stored, submitted)| {
        stored.position != submitted.position || stored.log2_size != submitted.log2_size
    }) {
        return Err(ComputeError::DriveMismatch { index });
    }

    let output_root = merkle::root_with_subtree(
        instance.output_position,
        LOG2_LITERAL_SIZE,
        merkle::literal_root(&claim.output),
        &claim.output_siblings,
    )?;
    if output_root != claim.final_hash {
        return Err(ComputeError::InvalidOutputProof);
    }

    let mut initial_hash = instance.initial_hash;
    for (index, ((drive, siblings), hash)) in stored
        .iter()
        .zip(&claim.drive_siblings)
        .zip(instance.drives.hashes())
        .enumerate()
    {
        let fold = |leaf: H256| {
            merkle::root_with_subtree(drive.position, drive.log2_size, leaf, siblings)
                .map_err(|source| ComputeError::InvalidDrive { index, source })
        };
        let pristine = merkle::pristine_hash(drive.log2_size)?;
        if fold(pristine)? != initial_hash {
            return Err(ComputeError::InvalidDriveProof { index });
        }
        initial_hash = fold(*hash)?;
    }
    Ok(initial_hash)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        merkle::SparseTree,
        stubs::{ManualClock, MemoryGame, MemoryLogger},
        ErrorKind, Verdict,
    };

    const START: u64 = 1_700_000_000;
    const OUTPUT_POSITION: u64 = 0x9000_0000_0000_0000;

    fn claimer() -> Address {
        Address::repeat_byte(0xc1)
    }

    fn challenger() -> Address {
        Address::repeat_byte(0xc2)
    }

    fn provider() -> Address {
        Address::repeat_byte(0xd0)
    }

    struct Harness {
        manager: ComputeManager,
        logger: Arc<MemoryLogger>,
        game: Arc<MemoryGame>,
        clock: Arc<ManualClock>,
        template: SparseTree,
    }

    impl Harness {
        fn new() -> Self {
            let logger = Arc::new(MemoryLogger::default());
            let game = Arc::new(MemoryGame::default());
            let clock = Arc::new(ManualClock::new(START));
            let manager = ComputeManager::new(
                ManagerConfig {
                    machine: Address::repeat_byte(0xee),
                    verification_game: Address::repeat_byte(0xff),
                    ..Default::default()
                },
                logger.clone(),
                game.clone(),
                clock.clone(),
            );
            // The template carries a ROM; drive slots are left pristine.
            let mut template = SparseTree::new();
            template
                .mount(0x1000, 12, H256::repeat_byte(0x0f))
                .unwrap();
            Self {
                manager,
                logger,
                game,
                clock,
                template,
            }
        }

        fn params(&self, drives: Vec<Drive>) -> InstanceParams {
            InstanceParams {
                final_time: 1_000_000,
                template_hash: self.template.root().unwrap(),
                output_position: OUTPUT_POSITION,
                round_duration: 7200,
                claimer: claimer(),
                challenger: challenger(),
                drives,
            }
        }

        fn claim(&self, id: InstanceId, output: H256) -> Claim {
            let instance = self.manager.instance(id).unwrap();
            Claim::build(
                &self.template,
                instance.drives.drives(),
                instance.drives.hashes(),
                &SparseTree::new(),
                OUTPUT_POSITION,
                output,
            )
            .unwrap()
        }

        fn claimed(&mut self) -> (InstanceId, Claim) {
            let id = self.manager.instantiate(self.params(two_literals())).unwrap();
            let claim = self.claim(id, H256::repeat_byte(0x99));
            self.manager.submit_claim(id, claimer(), &claim).unwrap();
            (id, claim)
        }
    }

    fn literal(position: u64, byte: u8) -> Drive {
        Drive {
            position,
            log2_size: 5,
            direct_value: H256::repeat_byte(byte),
            ..Default::default()
        }
    }

    fn two_literals() -> Vec<Drive> {
        vec![
            literal(0x8000_0000_0000_0000, 1),
            literal(0x8000_0000_0000_0020, 2),
        ]
    }

    fn provided_literal(position: u64) -> Drive {
        Drive {
            position,
            log2_size: 5,
            provider: provider(),
            needs_provider: true,
            ..Default::default()
        }
    }

    #[test]
    fn immediate_drives_start_waiting_for_the_claim() {
        let mut h = Harness::new();
        let id = h.manager.instantiate(h.params(two_literals())).unwrap();

        assert_eq!(id, 0);
        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingClaim");
        let view = h.manager.get_state(id).unwrap();
        assert_eq!(
            view.drive_hashes,
            vec![
                merkle::literal_root(&H256::repeat_byte(1)),
                merkle::literal_root(&H256::repeat_byte(2))
            ]
        );
        assert_eq!(view.time_of_last_move, START);
        assert_eq!(view.initial_hash, view.template_hash);
        assert!(view.pending_drives.is_empty());
        assert_eq!(
            h.manager.drain_events(),
            vec![Event::Created {
                id,
                claimer: claimer(),
                challenger: challenger(),
                state: State::WaitingClaim
            }]
        );
        assert!(h.manager.drain_events().is_empty());
    }

    #[test]
    fn instantiate_rejects_identical_parties() {
        let mut h = Harness::new();
        let mut params = h.params(two_literals());
        params.challenger = params.claimer;
        assert_eq!(
            h.manager.instantiate(params),
            Err(ComputeError::SameParties(claimer()))
        );
        assert_eq!(h.manager.instance_count(), 0);
        assert!(h.manager.drain_events().is_empty());
    }

    #[test]
    fn provider_drive_moves_to_claim_phase() {
        let mut h = Harness::new();
        let id = h
            .manager
            .instantiate(h.params(vec![provided_literal(0x8000_0000_0000_0000)]))
            .unwrap();
        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingProviders");

        let value = H256::repeat_byte(0x5a);
        let err = h
            .manager
            .claim_direct_drive(id, claimer(), value)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingProviders");

        h.clock.advance(60);
        h.manager.claim_direct_drive(id, provider(), value).unwrap();
        let view = h.manager.get_state(id).unwrap();
        assert_eq!(view.current_state, State::WaitingClaim);
        assert_eq!(view.drive_hashes[0], merkle::literal_root(&value));
        assert_eq!(view.pending_drives_pointer, 1);
        assert_eq!(view.time_of_last_move, START + 60);

        // Nothing is pending anymore.
        assert_eq!(
            h.manager.claim_direct_drive(id, provider(), value),
            Err(ComputeError::InvalidState {
                expected: State::WaitingProviders,
                actual: State::WaitingClaim
            })
        );
    }

    #[test]
    fn logger_drives_resolve_in_order() {
        let mut h = Harness::new();
        let root = H256::repeat_byte(0x44);
        let logged = Drive {
            position: 0xa000_0000_0000_0000,
            log2_size: 20,
            logger_root: root,
            provider: provider(),
            needs_logger: true,
            ..Default::default()
        };
        let id = h
            .manager
            .instantiate(h.params(vec![provided_literal(0x8000_0000_0000_0000), logged]))
            .unwrap();
        assert_eq!(h.manager.get_state(id).unwrap().pending_drives, vec![0, 1]);

        // The logged drive is second in line.
        h.logger.publish(root, 20);
        assert!(matches!(
            h.manager.claim_logger_drive(id, provider(), root),
            Err(ComputeError::WrongDriveKind { index: 0, .. })
        ));
        h.manager
            .claim_direct_drive(id, provider(), H256::repeat_byte(3))
            .unwrap();
        h.manager.claim_logger_drive(id, provider(), root).unwrap();

        let view = h.manager.get_state(id).unwrap();
        assert_eq!(view.current_state, State::WaitingClaim);
        assert_eq!(view.drive_hashes[1], root);
        let resolved: Vec<_> = h
            .manager
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                Event::DriveResolved { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(resolved, vec![0, 1]);
    }

    #[test]
    fn valid_claim_folds_drives_into_the_initial_hash() {
        let mut h = Harness::new();
        let (id, claim) = h.claimed();

        let view = h.manager.get_state(id).unwrap();
        assert_eq!(view.current_state, State::WaitingConfirmation);
        assert_eq!(view.claimed_final_hash, Some(claim.final_hash));
        assert_eq!(view.claimed_output, Some(H256::repeat_byte(0x99)));

        let mut mounted = h.template.clone();
        for (drive, hash) in view.drives.iter().zip(&view.drive_hashes) {
            mounted.mount(drive.position, drive.log2_size, *hash).unwrap();
        }
        assert_eq!(view.initial_hash, mounted.root().unwrap());
    }

    #[test]
    fn corrupted_claims_fail_without_mutation() {
        let mut h = Harness::new();
        let id = h.manager.instantiate(h.params(two_literals())).unwrap();
        let claim = h.claim(id, H256::repeat_byte(0x99));
        let before = h.manager.get_state(id).unwrap();

        let mut bad_sibling = claim.clone();
        bad_sibling.drive_siblings[1][7] = H256::repeat_byte(0xab);
        assert_eq!(
            h.manager.submit_claim(id, claimer(), &bad_sibling),
            Err(ComputeError::InvalidDriveProof { index: 1 })
        );

        let mut bad_output = claim.clone();
        bad_output.output = H256::repeat_byte(0x98);
        assert_eq!(
            h.manager.submit_claim(id, claimer(), &bad_output),
            Err(ComputeError::InvalidOutputProof)
        );

        let mut bad_position = claim.clone();
        bad_position.drives[0].position += 0x100;
        assert_eq!(
            h.manager.submit_claim(id, claimer(), &bad_position),
            Err(ComputeError::DriveMismatch { index: 0 })
        );

        let mut bad_size = claim.clone();
        bad_size.drives[1].log2_size = 6;
        assert_eq!(
            h.manager.submit_claim(id, claimer(), &bad_size),
            Err(ComputeError::DriveMismatch { index: 1 })
        );

        let mut missing = claim.clone();
        missing.drives.pop();
        assert_eq!(
            h.manager.submit_claim(id, claimer(), &missing),
            Err(ComputeError::CountMismatch {
                expected: 2,
                actual: 1
            })
        );

        let mut short_path = claim.clone();
        short_path.drive_siblings[0].pop();
        assert!(matches!(
            h.manager.submit_claim(id, claimer(), &short_path),
            Err(ComputeError::InvalidDrive { index: 0, .. })
        ));

        assert_eq!(
            h.manager.submit_claim(id, challenger(), &claim).unwrap_err().kind(),
            ErrorKind::Authorization
        );

        assert_eq!(h.manager.get_state(id).unwrap(), before);
        h.manager.submit_claim(id, claimer(), &claim).unwrap();
    }

    #[test]
    fn confirmed_claim_reports_consensus() {
        let mut h = Harness::new();
        let (id, _) = h.claimed();

        assert_eq!(
            h.manager.confirm(id, claimer()).unwrap_err().kind(),
            ErrorKind::Authorization
        );
        h.manager.confirm(id, challenger()).unwrap();

        assert_eq!(h.manager.get_current_state(id).unwrap(), "ConsensusResult");
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult {
                ready: true,
                running: false,
                blame: None,
                output: Some(H256::repeat_byte(0x99)),
            }
        );
        assert!(!h.manager.is_active(id).unwrap());
        assert_eq!(h.manager.max_state_duration(id).unwrap(), 0);
        let events = h.manager.drain_events();
        assert!(events.ends_with(&[
            Event::ResultConfirmed { id },
            Event::Finished {
                id,
                state: State::ConsensusResult
            }
        ]));
        assert_eq!(
            h.manager.challenge(id, challenger()).unwrap_err().kind(),
            ErrorKind::StateGuard
        );
    }

    #[test]
    fn challenger_win_blames_the_claimer() {
        let mut h = Harness::new();
        let (id, claim) = h.claimed();
        h.manager.challenge(id, challenger()).unwrap();

        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingChallenge");
        assert_eq!(
            h.manager.get_sub_instances(id).unwrap(),
            vec![SubInstance {
                game: Address::repeat_byte(0xff),
                index: 0
            }]
        );
        let params = h.game.params(0).unwrap();
        assert_eq!(params.claimed_final_hash, claim.final_hash);
        assert_eq!(params.initial_hash, h.manager.instance(id).unwrap().initial_hash);
        assert_eq!(params.machine, Address::repeat_byte(0xee));
        assert_eq!(params.final_time, 1_000_000);

        assert_eq!(h.manager.win_by_vg(id), Err(ComputeError::VerdictPending(0)));
        assert!(h.manager.get_result(id).unwrap().running);

        h.game.settle(0, Verdict::ChallengerWon);
        assert_eq!(h.manager.win_by_vg(id), Ok(State::ChallengerWon));
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult::blamed(claimer())
        );
        assert!(h.manager.get_sub_instances(id).unwrap().is_empty());
    }

    #[test]
    fn claimer_win_blames_the_challenger_and_keeps_the_output() {
        let mut h = Harness::new();
        let (id, _) = h.claimed();
        h.manager.challenge(id, challenger()).unwrap();
        h.game.settle(0, Verdict::ClaimerWon);

        assert_eq!(h.manager.win_by_vg(id), Ok(State::ClaimerWon));
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult {
                ready: true,
                running: false,
                blame: Some(challenger()),
                output: Some(H256::repeat_byte(0x99)),
            }
        );
        assert_eq!(
            h.manager.win_by_vg(id).unwrap_err().kind(),
            ErrorKind::StateGuard
        );
    }

    #[test]
    fn missing_claim_is_aborted_after_the_deadline() {
        let mut h = Harness::new();
        let id = h.manager.instantiate(h.params(two_literals())).unwrap();
        let duration = h.manager.max_state_duration(id).unwrap();
        assert_eq!(duration, 40 + 7200);

        h.clock.set(START + duration);
        assert_eq!(
            h.manager.abort_by_deadline(id),
            Err(ComputeError::DeadlineNotElapsed {
                deadline: START + duration,
                now: START + duration
            })
        );
        assert!(!h.manager.deadline_elapsed(id).unwrap());

        h.clock.advance(1);
        assert!(h.manager.deadline_elapsed(id).unwrap());
        assert_eq!(h.manager.abort_by_deadline(id), Ok(State::ClaimerMissedDeadline));
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult::blamed(claimer())
        );
        assert_eq!(
            h.manager.abort_by_deadline(id),
            Err(ComputeError::NotAbortable(State::ClaimerMissedDeadline))
        );
    }

    #[test]
    fn missing_provider_is_aborted_and_blamed() {
        let mut h = Harness::new();
        let id = h
            .manager
            .instantiate(h.params(vec![provided_literal(0x8000_0000_0000_0000)]))
            .unwrap();
        let duration = h.manager.max_state_duration(id).unwrap();
        assert_eq!(duration, 40 + 2400 + 7200);

        h.clock.set(START + duration);
        assert_eq!(
            h.manager.abort_by_deadline(id).unwrap_err().kind(),
            ErrorKind::Temporal
        );
        h.clock.advance(1);
        assert_eq!(h.manager.abort_by_deadline(id), Ok(State::ProviderMissedDeadline));
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult::blamed(provider())
        );
    }

    #[test]
    fn resolving_a_drive_restarts_the_clock() {
        let mut h = Harness::new();
        let id = h
            .manager
            .instantiate(h.params(vec![provided_literal(0x8000_0000_0000_0000)]))
            .unwrap();
        h.clock.advance(9000);
        h.manager
            .claim_direct_drive(id, provider(), H256::zero())
            .unwrap();

        // The claim phase deadline counts from the resolution, not from creation.
        h.clock.advance(40 + 7200);
        assert!(h.manager.abort_by_deadline(id).is_err());
        h.clock.advance(1);
        assert_eq!(h.manager.abort_by_deadline(id), Ok(State::ClaimerMissedDeadline));
    }

    /// Documented gap: an unresponsive challenger is not aborted. The claim is instead reported
    /// as accepted once the confirmation deadline elapsed, and that result is final.
    #[test]
    fn confirmation_phase_is_not_abortable() {
        let mut h = Harness::new();
        let (id, _) = h.claimed();
        let duration = h.manager.max_state_duration(id).unwrap();
        h.clock.advance(duration);
        assert!(h.manager.is_active(id).unwrap());
        h.clock.advance(1);

        assert_eq!(
            h.manager.abort_by_deadline(id),
            Err(ComputeError::NotAbortable(State::WaitingConfirmation))
        );
        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingConfirmation");
        assert_eq!(
            h.manager.get_result(id).unwrap(),
            ComputeResult {
                ready: true,
                running: false,
                blame: None,
                output: Some(H256::repeat_byte(0x99)),
            }
        );
        assert!(!h.manager.is_active(id).unwrap());

        // The challenger can no longer act on it.
        h.manager.drain_events();
        assert!(matches!(
            h.manager.confirm(id, challenger()),
            Err(ComputeError::ConfirmationExpired { .. })
        ));
        assert!(h.manager.drain_events().is_empty());
    }

    #[test]
    fn late_challenge_cannot_overturn_an_accepted_claim() {
        let mut h = Harness::new();
        let (id, _) = h.claimed();
        let duration = h.manager.max_state_duration(id).unwrap();
        h.clock.advance(duration + 1);
        let accepted = h.manager.get_result(id).unwrap();
        assert!(accepted.ready);

        let err = h.manager.challenge(id, challenger()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Temporal);
        assert!(h.game.is_empty());
        assert_eq!(h.manager.get_current_state(id).unwrap(), "WaitingConfirmation");
        assert!(h.manager.get_sub_instances(id).unwrap().is_empty());
        assert_eq!(h.manager.get_result(id).unwrap(), accepted);

        // The last second of the window still allows a challenge.
        let (other, _) = h.claimed();
        h.clock.advance(h.manager.max_state_duration(other).unwrap());
        h.manager.challenge(other, challenger()).unwrap();
        assert_eq!(h.manager.get_current_state(other).unwrap(), "WaitingChallenge");
    }

    #[test]
    fn overlapping_drives_cannot_be_instantiated() {
        let mut h = Harness::new();
        let drives = vec![
            literal(0x8000_0000_0000_0000, 1),
            literal(0x8000_0000_0000_0000, 2),
        ];
        let err = h.manager.instantiate(h.params(drives)).unwrap_err();
        assert_eq!(err, ComputeError::DriveOverlap { index: 1, other: 0 });
        assert_eq!(err.kind(), ErrorKind::DataConsistency);
        assert_eq!(h.manager.instance_count(), 0);
    }

    /// Documented gap: a stalled verification game keeps the instance running forever.
    #[test]
    fn challenge_phase_is_not_abortable() {
        let mut h = Harness::new();
        let (id, _) = h.claimed();
        h.manager.challenge(id, challenger()).unwrap();
        let duration = h.manager.max_state_duration(id).unwrap();
        assert!(duration > 7200);
        h.clock.advance(duration + 1);

        assert_eq!(
            h.manager.abort_by_deadline(id),
            Err(ComputeError::NotAbortable(State::WaitingChallenge))
        );
        assert!(h.manager.get_result(id).unwrap().running);
    }

    #[test]
    fn queries_on_unknown_instances_fail() {
        let h = Harness::new();
        assert_eq!(
            h.manager.get_current_state(3),
            Err(ComputeError::UnknownInstance(3))
        );
        assert!(h.manager.is_concerned(0, claimer()).is_err());
    }

    #[test]
    fn concerned_parties() {
        let mut h = Harness::new();
        let id = h.manager.instantiate(h.params(two_literals())).unwrap();
        assert!(h.manager.is_concerned(id, claimer()).unwrap());
        assert!(h.manager.is_concerned(id, challenger()).unwrap());
        assert!(!h.manager.is_concerned(id, provider()).unwrap());
    }

    #[test]
    fn instances_are_independent() {
        let mut h = Harness::new();
        let first = h.manager.instantiate(h.params(two_literals())).unwrap();
        let (second, _) = h.claimed();
        assert_eq!(second, first + 1);

        h.manager.confirm(second, challenger()).unwrap();
        assert_eq!(h.manager.get_current_state(first).unwrap(), "WaitingClaim");
        assert_eq!(h.manager.get_current_state(second).unwrap(), "ConsensusResult");
    }

    #[test]
    fn view_serializes_to_json() {
        let mut h = Harness::new();
        let id = h.manager.instantiate(h.params(two_literals())).unwrap();
        let json = serde_json::to_value(h.manager.get_state(id).unwrap()).unwrap();
        assert_eq!(json["currentState"], "WaitingClaim");
        assert_eq!(json["pendingDrivesPointer"], 0);
        assert_eq!(json["drives"].as_array().map(Vec::len), Some(2));
    }
}
