//! The seven canonical phases of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RunError;

/// Execution phase of a Run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Normalize the goal.
    #[default]
    Intake,
    /// Gather evidence.
    Explore,
    /// Choose the next step.
    Decide,
    /// Perform side effects. The only phase permitting side-effecting capability calls.
    Act,
    /// Confirm the outcome.
    Validate,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Failed,
}

impl State {
    pub const ALL: [State; 7] = [
        State::Intake,
        State::Explore,
        State::Decide,
        State::Act,
        State::Validate,
        State::Done,
        State::Failed,
    ];

    /// Terminality is exactly `{done, failed}`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn allows_side_effects(&self) -> bool {
        matches!(self, Self::Act)
    }

    /// Whether the phase graph has an edge from `self` to `next`.
    ///
    /// `Run::transition_to` does not consult this; the engine that maps
    /// decisions onto transitions does.
    pub fn can_transition_to(&self, next: State) -> bool {
        use State::{Act, Decide, Done, Explore, Failed, Intake, Validate};

        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Intake, Explore | Decide) => true,
            (Explore, Explore | Decide) => true,
            (Decide, Explore | Act | Validate | Done) => true,
            (Act, Act | Decide | Validate) => true,
            (Validate, Decide | Act | Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Explore => "explore",
            Self::Decide => "decide",
            Self::Act => "act",
            Self::Validate => "validate",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| RunError::InvalidState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        for state in State::ALL {
            let expected = matches!(state, State::Done | State::Failed);
            assert_eq!(state.is_terminal(), expected, "{state}");
        }
    }

    #[test]
    fn test_only_act_allows_side_effects() {
        for state in State::ALL {
            assert_eq!(state.allows_side_effects(), state == State::Act, "{state}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in State::ALL {
            assert!(!State::Done.can_transition_to(next));
            assert!(!State::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_intake_cannot_jump_to_act() {
        assert!(!State::Intake.can_transition_to(State::Act));
        assert!(State::Intake.can_transition_to(State::Explore));
        assert!(State::Decide.can_transition_to(State::Act));
        assert!(State::Act.can_transition_to(State::Failed));
    }

    #[test]
    fn test_parse_round_trip() {
        for state in State::ALL {
            assert_eq!(state.as_str().parse::<State>().unwrap(), state);
        }
        assert_eq!(
            "sleeping".parse::<State>(),
            Err(RunError::InvalidState("sleeping".to_string()))
        );
    }
}
