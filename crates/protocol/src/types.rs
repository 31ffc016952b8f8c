use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport used by the flight-control link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Datagram link (`udp://`).
    #[default]
    Udp,
    /// Stream link (`tcp://`).
    Tcp,
    /// Serial device; `host` holds the device path and `port` the baud rate.
    Serial,
}

impl LinkKind {
    /// URL scheme understood by flight-control clients.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Serial => "serial",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Where a vehicle's telemetry/command link is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: LinkKind,
    /// Empty host means "listen on any address".
    #[serde(default)]
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Returns the connection URL, e.g. `udp://:14541` or `tcp://10.0.0.2:5760`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.kind.scheme(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Identity and addressing of one fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    /// 1-based id, equal to the member's position in fleet order.
    pub id: u32,
    /// Host of the per-vehicle companion (command) server.
    pub command_host: String,
    /// Port of the per-vehicle companion (command) server.
    pub command_port: u16,
    /// Vehicle link endpoint.
    pub endpoint: Endpoint,
}

impl AgentDescriptor {
    /// Returns `host:port` of the companion command server.
    pub fn command_address(&self) -> String {
        let host = if self.command_host.is_empty() {
            "localhost"
        } else {
            &self.command_host
        };
        format!("{host}:{}", self.command_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_with_empty_host() {
        let ep = Endpoint {
            kind: LinkKind::Udp,
            host: String::new(),
            port: 14541,
        };
        assert_eq!(ep.url(), "udp://:14541");
        assert_eq!(ep.to_string(), "udp://:14541");
    }

    #[test]
    fn endpoint_url_tcp() {
        let ep = Endpoint {
            kind: LinkKind::Tcp,
            host: "10.0.0.2".into(),
            port: 5760,
        };
        assert_eq!(ep.url(), "tcp://10.0.0.2:5760");
    }

    #[test]
    fn link_kind_serialization() {
        assert_eq!(serde_json::to_string(&LinkKind::Serial).unwrap(), "\"serial\"");
        let kind: LinkKind = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(kind, LinkKind::Tcp);
    }

    #[test]
    fn command_address_defaults_to_localhost() {
        let desc = AgentDescriptor {
            id: 1,
            command_host: String::new(),
            command_port: 50041,
            endpoint: Endpoint {
                kind: LinkKind::Udp,
                host: String::new(),
                port: 14541,
            },
        };
        assert_eq!(desc.command_address(), "localhost:50041");
    }

    #[test]
    fn descriptor_field_names() {
        let desc = AgentDescriptor {
            id: 2,
            command_host: "sim".into(),
            command_port: 50042,
            endpoint: Endpoint {
                kind: LinkKind::Udp,
                host: String::new(),
                port: 14542,
            },
        };
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("\"commandPort\":50042"));
        assert!(json.contains("\"kind\":\"udp\""));
    }
}
