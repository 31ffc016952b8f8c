//! Fleet phases and their aggregated outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use flotilla_agent::{Agent, AgentError, GotoTarget, OrbitRequest};

/// One operation applied to every member of the fleet.
///
/// `Goto` and `Orbit` carry one entry per member, in fleet order.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Connect,
    Arm,
    Takeoff,
    Goto(Vec<GotoTarget>),
    Orbit(Vec<OrbitRequest>),
    ReturnToLaunch,
    Land,
    Disarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Connect,
    Arm,
    Takeoff,
    Goto,
    Orbit,
    ReturnToLaunch,
    Land,
    Disarm,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Arm => "arm",
            Self::Takeoff => "takeoff",
            Self::Goto => "goto",
            Self::Orbit => "orbit",
            Self::ReturnToLaunch => "return_to_launch",
            Self::Land => "land",
            Self::Disarm => "disarm",
        };
        f.write_str(s)
    }
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Connect => PhaseKind::Connect,
            Self::Arm => PhaseKind::Arm,
            Self::Takeoff => PhaseKind::Takeoff,
            Self::Goto(_) => PhaseKind::Goto,
            Self::Orbit(_) => PhaseKind::Orbit,
            Self::ReturnToLaunch => PhaseKind::ReturnToLaunch,
            Self::Land => PhaseKind::Land,
            Self::Disarm => PhaseKind::Disarm,
        }
    }

    /// Number of per-member entries, for phases that carry them.
    pub(crate) fn targets(&self) -> Option<usize> {
        match self {
            Self::Goto(t) => Some(t.len()),
            Self::Orbit(r) => Some(r.len()),
            _ => None,
        }
    }

    /// Splits the phase into one step per member.
    pub(crate) fn into_steps(self, members: usize) -> Vec<Step> {
        match self {
            Self::Goto(targets) => targets.into_iter().map(Step::Goto).collect(),
            Self::Orbit(requests) => requests.into_iter().map(Step::Orbit).collect(),
            Self::Connect => vec![Step::Connect; members],
            Self::Arm => vec![Step::Arm; members],
            Self::Takeoff => vec![Step::Takeoff; members],
            Self::ReturnToLaunch => vec![Step::ReturnToLaunch; members],
            Self::Land => vec![Step::Land; members],
            Self::Disarm => vec![Step::Disarm; members],
        }
    }
}

/// What one member does within a phase.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Connect,
    Arm,
    Takeoff,
    Goto(GotoTarget),
    Orbit(OrbitRequest),
    ReturnToLaunch,
    Land,
    Disarm,
}

impl Step {
    pub(crate) async fn run(self, agent: &Agent) -> Result<(), AgentError> {
        match self {
            Self::Connect => agent.connect().await,
            Self::Arm => agent.arm().await,
            Self::Takeoff => agent.takeoff().await,
            Self::Goto(target) => agent.goto_location(target, 0.0).await,
            Self::Orbit(request) => agent.orbit(request).await,
            Self::ReturnToLaunch => agent.return_to_launch().await,
            Self::Land => agent.land().await,
            Self::Disarm => agent.disarm().await,
        }
    }
}

/// How a phase reacts to a member failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhasePolicy {
    /// Let every member finish, then report all failures.
    #[default]
    BestEffort,
    /// Abort the remaining members at the first failure.
    FailFast,
}

/// Result of one member in one phase.
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed,
    Failed(AgentError),
    /// Aborted before finishing because another member failed.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub agent_id: u32,
    pub outcome: Outcome,
}

/// Outcome of every member in one phase, in fleet order.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub outcomes: Vec<AgentOutcome>,
    /// Id of the member whose failure was observed first.
    pub first_failure: Option<u32>,
}

impl PhaseReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.outcome, Outcome::Completed))
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Completed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled))
    }

    /// Every failure, in fleet order.
    pub fn failures(&self) -> impl Iterator<Item = &AgentError> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    /// The failure observed first, if any.
    pub fn first_error(&self) -> Option<&AgentError> {
        let id = self.first_failure?;
        self.outcomes
            .iter()
            .find(|o| o.agent_id == id)
            .and_then(|o| match &o.outcome {
                Outcome::Failed(e) => Some(e),
                _ => None,
            })
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_agent::Operation;

    #[test]
    fn uniform_phase_expands_per_member() {
        let steps = Phase::Takeoff.into_steps(3);
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| matches!(s, Step::Takeoff)));
        assert_eq!(Phase::Takeoff.targets(), None);
    }

    #[test]
    fn each_uniform_phase_keeps_its_own_step() {
        assert!(matches!(Phase::Disarm.into_steps(1)[..], [Step::Disarm]));
        assert!(matches!(Phase::Land.into_steps(1)[..], [Step::Land]));
        assert!(matches!(
            Phase::ReturnToLaunch.into_steps(1)[..],
            [Step::ReturnToLaunch]
        ));
        assert!(matches!(Phase::Connect.into_steps(2)[..], [Step::Connect, Step::Connect]));
        assert!(Phase::Arm.into_steps(0).is_empty());
    }

    #[test]
    fn policy_names() {
        assert_eq!(
            serde_json::to_string(&PhasePolicy::BestEffort).unwrap(),
            "\"best-effort\""
        );
        let p: PhasePolicy = serde_json::from_str("\"fail-fast\"").unwrap();
        assert_eq!(p, PhasePolicy::FailFast);
    }

    #[test]
    fn report_counts() {
        let report = PhaseReport {
            phase: PhaseKind::Land,
            outcomes: vec![
                AgentOutcome {
                    agent_id: 1,
                    outcome: Outcome::Completed,
                },
                AgentOutcome {
                    agent_id: 2,
                    outcome: Outcome::Failed(AgentError::TimedOut {
                        agent_id: 2,
                        operation: Operation::Land,
                    }),
                },
                AgentOutcome {
                    agent_id: 3,
                    outcome: Outcome::Cancelled,
                },
            ],
            first_failure: Some(2),
        };
        assert!(!report.is_success());
        assert_eq!(
            (report.completed(), report.failed(), report.cancelled()),
            (1, 1, 1)
        );
        assert_eq!(report.first_error().map(AgentError::agent_id), Some(2));
        assert_eq!(report.failures().count(), 1);
    }
}
