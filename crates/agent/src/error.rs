use flotilla_link::LinkError;
use flotilla_protocol::ActionError;

use crate::types::Operation;

/// Errors from agent operations. Every variant names the agent it came from.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent_id}: link error: {source}")]
    Link {
        agent_id: u32,
        #[source]
        source: LinkError,
    },

    #[error("agent {agent_id}: {operation} rejected: {source}")]
    Action {
        agent_id: u32,
        operation: Operation,
        #[source]
        source: ActionError,
    },

    #[error("agent {agent_id}: {operation} timed out")]
    TimedOut { agent_id: u32, operation: Operation },

    #[error("agent {agent_id}: {operation} cancelled")]
    Cancelled { agent_id: u32, operation: Operation },

    #[error("agent {agent_id}: {feed} feed closed during {operation}")]
    FeedClosed {
        agent_id: u32,
        operation: Operation,
        feed: &'static str,
    },
}

impl AgentError {
    pub fn agent_id(&self) -> u32 {
        match self {
            Self::Link { agent_id, .. }
            | Self::Action { agent_id, .. }
            | Self::TimedOut { agent_id, .. }
            | Self::Cancelled { agent_id, .. }
            | Self::FeedClosed { agent_id, .. } => *agent_id,
        }
    }

    /// The operation that failed. Link errors only happen while connecting.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Link { .. } => Operation::Connect,
            Self::Action { operation, .. }
            | Self::TimedOut { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::FeedClosed { operation, .. } => *operation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_protocol::ActionResult;

    #[test]
    fn display_names_agent_and_operation() {
        let err = AgentError::Action {
            agent_id: 2,
            operation: Operation::Takeoff,
            source: ActionError::new(ActionResult::CommandDenied, "not armed"),
        };
        assert_eq!(err.to_string(), "agent 2: takeoff rejected: command denied: not armed");
        assert_eq!(err.agent_id(), 2);
        assert_eq!(err.operation(), Operation::Takeoff);
    }

    #[test]
    fn link_errors_belong_to_connect() {
        let err = AgentError::Link {
            agent_id: 1,
            source: LinkError::Transport("refused".into()),
        };
        assert_eq!(err.operation(), Operation::Connect);
        assert!(!err.is_cancelled());
    }
}
