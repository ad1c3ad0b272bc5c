use serde::Deserialize;

use coproguard_core::error::{GuardError, Result};

use crate::policy::misordered_pair;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub version: u32,

    #[serde(default)]
    pub ops: OpsSection,

    #[serde(default)]
    pub guard: GuardSection,
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(GuardError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.ops.validate()?;
        self.guard.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            return Err(GuardError::Config("ops.listen must not be empty".into()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:9464".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_policies")]
    pub policies: Vec<PolicySpec>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            policies: default_policies(),
        }
    }
}

impl GuardSection {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(GuardError::Config("guard.namespace must not be empty".into()));
        }
        if self.policies.is_empty() {
            return Err(GuardError::Config("guard.policies must not be empty".into()));
        }
        for p in &self.policies {
            p.validate()?;
        }
        let order = self
            .policies
            .iter()
            .map(|p| (p.kind_name(), p.vetoes(), p.reports_outcome()));
        if let Some((reporter, vetoer)) = misordered_pair(order) {
            return Err(GuardError::Config(format!(
                "guard.policies: `{reporter}` must come before `{vetoer}`"
            )));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "Coprocessors".into()
}

/// Stock chain: timeout, logging, metrics, bypass/complete invariant.
fn default_policies() -> Vec<PolicySpec> {
    vec![
        PolicySpec::Timeout {
            timeout_ms: default_timeout_ms(),
        },
        PolicySpec::Logging,
        PolicySpec::Metrics,
        PolicySpec::NoBypassOrComplete,
    ]
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_sample_window_ms() -> u64 {
    500
}

/// One chain entry. Order in the list is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum PolicySpec {
    Timeout {
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Logging,
    Metrics,
    NoBypassOrComplete,
    RetryLimit {
        max_consecutive_failures: u32,
    },
    MaxMemory {
        byte_bound: u64,
        #[serde(default = "default_sample_window_ms")]
        sample_window_ms: u64,
    },
}

impl PolicySpec {
    /// The `kind:` tag of this entry.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PolicySpec::Timeout { .. } => "timeout",
            PolicySpec::Logging => "logging",
            PolicySpec::Metrics => "metrics",
            PolicySpec::NoBypassOrComplete => "no_bypass_or_complete",
            PolicySpec::RetryLimit { .. } => "retry_limit",
            PolicySpec::MaxMemory { .. } => "max_memory",
        }
    }

    fn vetoes(&self) -> bool {
        matches!(self, PolicySpec::NoBypassOrComplete)
    }

    fn reports_outcome(&self) -> bool {
        matches!(self, PolicySpec::Logging | PolicySpec::Metrics)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PolicySpec::Timeout { timeout_ms } => {
                if !(1..=600_000).contains(timeout_ms) {
                    return Err(GuardError::Config(
                        "timeout.timeout_ms must be between 1 and 600000".into(),
                    ));
                }
            }
            PolicySpec::RetryLimit {
                max_consecutive_failures,
            } => {
                if *max_consecutive_failures == 0 {
                    return Err(GuardError::Config(
                        "retry_limit.max_consecutive_failures must be at least 1".into(),
                    ));
                }
            }
            PolicySpec::MaxMemory { byte_bound, .. } => {
                if *byte_bound == 0 {
                    return Err(GuardError::Config(
                        "max_memory.byte_bound must be greater than 0".into(),
                    ));
                }
            }
            PolicySpec::Logging | PolicySpec::Metrics | PolicySpec::NoBypassOrComplete => {}
        }
        Ok(())
    }
}
