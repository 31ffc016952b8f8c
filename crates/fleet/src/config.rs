use flotilla_agent::AgentOptions;
use flotilla_protocol::{AgentDescriptor, Endpoint, LinkKind};

use crate::error::FleetError;
use crate::phase::PhasePolicy;

/// Size and addressing of a fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    /// Number of members.
    pub agents: u32,
    /// Member `i` (1-based) gets command port `command_port_base + i`.
    pub command_port_base: u16,
    /// Member `i` (1-based) gets link endpoint port `endpoint_port_base + i`.
    pub endpoint_port_base: u16,
    pub link: LinkKind,
    /// Host for both command server and link endpoint; empty means any.
    pub host: String,
    pub options: AgentOptions,
    pub policy: PhasePolicy,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            agents: 3,
            command_port_base: 50040,
            endpoint_port_base: 14540,
            link: LinkKind::Udp,
            host: String::new(),
            options: AgentOptions::default(),
            policy: PhasePolicy::default(),
        }
    }
}

impl FleetConfig {
    /// Descriptors for every member, in fleet order.
    pub fn descriptors(&self) -> Result<Vec<AgentDescriptor>, FleetError> {
        (1..=self.agents)
            .map(|id| {
                let command_port = offset_port(self.command_port_base, id)?;
                let port = offset_port(self.endpoint_port_base, id)?;
                Ok(AgentDescriptor {
                    id,
                    command_host: self.host.clone(),
                    command_port,
                    endpoint: Endpoint {
                        kind: self.link,
                        host: self.host.clone(),
                        port,
                    },
                })
            })
            .collect()
    }
}

fn offset_port(base: u16, id: u32) -> Result<u16, FleetError> {
    u32::from(base)
        .checked_add(id)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or(FleetError::PortRange { agent_id: id, base })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ports_are_one_based_and_distinct() {
        let config = FleetConfig {
            agents: 4,
            ..FleetConfig::default()
        };
        let descriptors = config.descriptors().unwrap();
        assert_eq!(descriptors.len(), 4);
        assert_eq!(descriptors[0].id, 1);
        assert_eq!(descriptors[0].command_port, 50041);
        assert_eq!(descriptors[0].endpoint.port, 14541);
        assert_eq!(descriptors[3].command_port, 50044);
        assert_eq!(descriptors[0].endpoint.url(), "udp://:14541");

        let endpoints: HashSet<_> = descriptors.iter().map(|d| d.endpoint.port).collect();
        let commands: HashSet<_> = descriptors.iter().map(|d| d.command_port).collect();
        assert_eq!(endpoints.len(), 4);
        assert_eq!(commands.len(), 4);
    }

    #[test]
    fn port_overflow_is_rejected() {
        let config = FleetConfig {
            agents: 3,
            endpoint_port_base: u16::MAX - 2,
            ..FleetConfig::default()
        };
        let err = config.descriptors().unwrap_err();
        assert!(matches!(err, FleetError::PortRange { agent_id: 3, .. }));
    }

    #[test]
    fn empty_fleet_has_no_descriptors() {
        let config = FleetConfig {
            agents: 0,
            ..FleetConfig::default()
        };
        assert!(config.descriptors().unwrap().is_empty());
    }
}
