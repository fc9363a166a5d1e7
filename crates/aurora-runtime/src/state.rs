//! Processing state machine.

use aurora_core::{PipelineState, StateTransition};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// One attempt's walk through the pipeline. A new attempt always starts at RECEIVED.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: PipelineState,
    stage_reached: PipelineState,
    transitions: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Received,
            stage_reached: PipelineState::Received,
            transitions: Vec::new(),
        }
    }

    /// Continue a machine from previously recorded transitions.
    pub fn resume(transitions: Vec<StateTransition>) -> Self {
        let mut machine = Self::new();
        for t in &transitions {
            machine.state = t.to;
            if t.to != PipelineState::Failed {
                machine.stage_reached = t.to;
            }
        }
        machine.transitions = transitions;
        machine
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Last state completed other than FAILED.
    pub fn stage_reached(&self) -> PipelineState {
        self.stage_reached
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// The state the pipeline is working towards from the current one.
    pub fn next_stage(&self) -> PipelineState {
        use PipelineState::*;
        match self.state {
            Received => Normalized,
            Normalized => Discovered,
            Discovered => Mapped,
            Mapped => Generated,
            Generated => Validated,
            Validated | AwaitingApproval => Deploying,
            Deploying | Deployed => Deployed,
            RolledBack => RolledBack,
            Failed => Failed,
        }
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at: chrono::Utc::now(),
        });
        self.state = next;
        if next != PipelineState::Failed {
            self.stage_reached = next;
        }
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn happy_path_records_every_transition() {
        let mut machine = StateMachine::new();
        for next in [Normalized, Discovered, Mapped, Generated, Validated, Deploying, Deployed] {
            machine.advance(next).unwrap();
        }
        assert_eq!(machine.state(), Deployed);
        assert_eq!(machine.transitions().len(), 7);
        assert_eq!(
            machine.advance(Failed),
            Err(InvalidTransition {
                from: Deployed,
                to: Failed
            })
        );
    }

    #[test]
    fn failure_keeps_stage_reached() {
        let mut machine = StateMachine::new();
        machine.advance(Normalized).unwrap();
        assert_eq!(machine.next_stage(), Discovered);
        machine.advance(Failed).unwrap();
        assert_eq!(machine.state(), Failed);
        assert_eq!(machine.stage_reached(), Normalized);
    }

    #[test]
    fn stages_cannot_be_skipped() {
        let mut machine = StateMachine::new();
        assert!(machine.advance(Deploying).is_err());
        assert_eq!(machine.state(), Received);
    }

    #[test]
    fn resume_continues_from_last_transition() {
        let mut machine = StateMachine::new();
        for next in [Normalized, Discovered, Mapped, Generated, Validated, AwaitingApproval] {
            machine.advance(next).unwrap();
        }
        let mut resumed = StateMachine::resume(machine.transitions().to_vec());
        assert_eq!(resumed.state(), AwaitingApproval);
        resumed.advance(Deploying).unwrap();
        assert_eq!(resumed.transitions().len(), 7);
    }
}
