//! Guard config loader (strict parsing).

pub mod schema;

use std::fs;

use coproguard_core::error::{GuardError, Result};

pub use schema::{GuardConfig, GuardSection, OpsSection, PolicySpec};

pub fn load_from_file(path: &str) -> Result<GuardConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| GuardError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GuardConfig> {
    let cfg: GuardConfig = serde_yaml::from_str(s)
        .map_err(|e| GuardError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
