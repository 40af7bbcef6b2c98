use anyhow::Result;
use arbiter_compute::{ComputeManager, ErrorKind, InstanceId, State};

/// An [Action] is a move the keeper made on behalf of nobody in particular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The verification game reached a verdict and the instance adopted it.
    Settled(State),
    /// The instance missed its deadline and was aborted.
    Aborted(State),
}

/// Advances a single instance as far as anyone is allowed to: adopts the verdict of a finished
/// verification game, or aborts a provider or claim phase whose deadline elapsed.
///
/// # Returns
/// * `Ok(Some(Action))` if the instance moved.
/// * `Ok(None)` if there is nothing to do yet.
/// * `Err` if the instance is unknown or refused the move for another reason.
pub fn advance_instance(manager: &mut ComputeManager, id: InstanceId) -> Result<Option<Action>> {
    match manager.instance(id)?.state {
        State::WaitingChallenge => match manager.win_by_vg(id) {
            Ok(state) => Ok(Some(Action::Settled(state))),
            Err(e) if e.kind() == ErrorKind::Temporal => {
                tracing::trace!(target: "deadline-keeper-driver", "Instance {} still waiting on its game: {}", id, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        },
        State::WaitingProviders | State::WaitingClaim => {
            if manager.deadline_elapsed(id)? {
                Ok(Some(Action::Aborted(manager.abort_by_deadline(id)?)))
            } else {
                Ok(None)
            }
        }
        // Only the challenger can move a pending confirmation.
        State::WaitingConfirmation
        | State::ProviderMissedDeadline
        | State::ClaimerMissedDeadline
        | State::ConsensusResult
        | State::ChallengerWon
        | State::ClaimerWon => Ok(None),
    }
}

/// Runs [advance_instance] over every active instance of the registry.
///
/// # Returns
/// * The actions taken, and the number of instances still active afterwards. Failures on one
///   instance are logged and do not stop the pass.
pub fn keeper_pass(manager: &mut ComputeManager) -> (Vec<(InstanceId, Action)>, usize) {
    let mut actions = Vec::new();
    let mut active = 0;

    for id in 0..manager.instance_count() {
        if !manager.is_active(id).unwrap_or(false) {
            continue;
        }
        match advance_instance(manager, id) {
            Ok(Some(action)) => {
                tracing::info!(target: "deadline-keeper-driver", "Instance {} advanced: {:?}", id, action);
                actions.push((id, action));
            }
            Ok(None) => {}
            Err(e) => {
                // Soft failure, log the error and continue.
                tracing::error!(target: "deadline-keeper-driver", "Error advancing instance {}: {}", id, e);
            }
        }
        if manager.is_active(id).unwrap_or(false) {
            active += 1;
        }
    }

    (actions, active)
}
