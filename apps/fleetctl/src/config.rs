//! Operator configuration.
//!
//! Stored as TOML. Every key is optional; a missing file means defaults plus
//! the built-in demo mission.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use flotilla_agent::AgentOptions;
use flotilla_fleet::{FleetConfig, Mission, MissionStep, PhasePolicy};
use flotilla_protocol::LinkKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetctlConfig {
    /// Number of vehicles.
    #[serde(default = "default_num_agents")]
    pub num_agents: u32,

    /// Vehicle `i` talks to its companion server on `command_port_base + i`.
    #[serde(default = "default_command_port_base")]
    pub command_port_base: u16,

    /// Vehicle `i` links on `endpoint_port_base + i`.
    #[serde(default = "default_endpoint_port_base")]
    pub endpoint_port_base: u16,

    #[serde(default)]
    pub link: LinkKind,

    /// Empty means any address.
    #[serde(default)]
    pub host: String,

    /// Upper bound on each telemetry wait. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<f64>,

    /// Pause between disarm and the second arm attempt.
    #[serde(default = "default_arm_settle_secs")]
    pub arm_settle_secs: f64,

    #[serde(default)]
    pub phase_policy: PhasePolicy,

    #[serde(default = "default_mission")]
    pub mission: Vec<MissionStep>,
}

fn default_num_agents() -> u32 {
    3
}

fn default_command_port_base() -> u16 {
    50040
}

fn default_endpoint_port_base() -> u16 {
    14540
}

fn default_arm_settle_secs() -> f64 {
    2.0
}

fn default_mission() -> Vec<MissionStep> {
    Mission::demo().steps
}

impl Default for FleetctlConfig {
    fn default() -> Self {
        Self {
            num_agents: default_num_agents(),
            command_port_base: default_command_port_base(),
            endpoint_port_base: default_endpoint_port_base(),
            link: LinkKind::default(),
            host: String::new(),
            wait_timeout_secs: None,
            arm_settle_secs: default_arm_settle_secs(),
            phase_policy: PhasePolicy::default(),
            mission: default_mission(),
        }
    }
}

impl FleetctlConfig {
    /// Loads `path`, or returns defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config
            .check()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Fleet settings derived from this configuration.
    pub fn fleet_config(&self) -> anyhow::Result<FleetConfig> {
        Ok(FleetConfig {
            agents: self.num_agents,
            command_port_base: self.command_port_base,
            endpoint_port_base: self.endpoint_port_base,
            link: self.link,
            host: self.host.clone(),
            options: AgentOptions {
                wait_timeout: self
                    .wait_timeout_secs
                    .map(|s| seconds("wait_timeout_secs", s))
                    .transpose()?,
                arm_settle: seconds("arm_settle_secs", self.arm_settle_secs)?,
            },
            policy: self.phase_policy,
        })
    }

    pub fn mission(&self) -> Mission {
        Mission::new(self.mission.clone())
    }

    /// Rejects durations that cannot be represented. The mission is checked
    /// against the fleet size later, since `simulate` can override it.
    pub fn check(&self) -> anyhow::Result<()> {
        self.fleet_config()?;
        for (index, step) in self.mission.iter().enumerate() {
            if let MissionStep::Hold { seconds: s } = step {
                seconds(&format!("mission[{index}].seconds"), *s)?;
            }
        }
        Ok(())
    }
}

fn seconds(key: &str, value: f64) -> anyhow::Result<Duration> {
    if value < 0.0 {
        bail!("{key} must be a non-negative number of seconds, got {value}");
    }
    match Duration::try_from_secs_f64(value) {
        Ok(d) => Ok(d),
        Err(_) => bail!("{key} is not a usable number of seconds: {value}"),
    }
}
