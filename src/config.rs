// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Epoch configuration documents: one YAML file per epoch, loaded with
//! `serde`/`serde_yaml` and matched against `--include`/`--exclude` glob
//! patterns with `globset`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Car {
        uri: String,
    },
    CarFromPieces {
        metadata: String,
        deals: String,
        piece_to_uri: Option<String>,
    },
    Filecoin {
        enable: bool,
        root_cid: String,
        providers: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexUris {
    pub cid_to_offset_and_size: Option<String>,
    pub slot_to_cid: Option<String>,
    pub sig_to_cid: Option<String>,
    pub sig_exists: Option<String>,
    pub slot_to_blocktime: Option<String>,
    /// Must be a local directory, not a remote URI.
    pub gsfa: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    pub epoch: u64,
    pub version: u32,
    pub network: String,
    pub data: DataSource,
    #[serde(default)]
    pub genesis: Option<GenesisConfig>,
    pub indexes: IndexUris,
}

impl EpochConfig {
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, EngineError> {
        serde_yaml::from_slice(bytes).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.epoch == 0 && self.genesis.is_none() {
            return Err(EngineError::Config("epoch 0 requires a genesis.uri".into()));
        }
        if self.indexes.cid_to_offset_and_size.is_none() {
            return Err(EngineError::Config(format!(
                "epoch {}: indexes.cid_to_offset_and_size.uri is required",
                self.epoch
            )));
        }
        Ok(())
    }
}

/// Compiles `--include`/`--exclude` glob patterns into matchers, then walks
/// a config directory loading and validating every matched `*.yaml` file.
pub struct ConfigMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl ConfigMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, EngineError> {
        let build = |patterns: &[String]| -> Result<GlobSet, EngineError> {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                builder.add(Glob::new(pattern).map_err(|e| EngineError::Config(e.to_string()))?);
            }
            builder.build().map_err(|e| EngineError::Config(e.to_string()))
        };
        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let include_ok = self.include.is_empty() || self.include.is_match(path);
        let exclude_hit = !self.exclude.is_empty() && self.exclude.is_match(path);
        include_ok && !exclude_hit
    }
}

pub fn discover_config_files(dir: &Path, matcher: &ConfigMatcher) -> Result<Vec<PathBuf>, EngineError> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if matcher.matches(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn load_epoch_configs(dir: &Path, matcher: &ConfigMatcher) -> Result<Vec<EpochConfig>, EngineError> {
    let mut configs = Vec::new();
    for path in discover_config_files(dir, matcher)? {
        let bytes = std::fs::read(&path)?;
        let config = EpochConfig::from_yaml(&bytes)?;
        config.validate()?;
        configs.push(config);
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
epoch: 5
version: 1
network: mainnet
data:
  car:
    uri: "https://example.invalid/epoch-5.car"
indexes:
  cid_to_offset_and_size: "epoch-5.cidx"
  slot_to_cid: "epoch-5.sidx"
  sig_to_cid: "epoch-5.gidx"
  sig_exists: "epoch-5.existsidx"
  slot_to_blocktime: "epoch-5.timeidx"
"#
    }

    #[test]
    fn parses_and_validates_a_minimal_config() {
        let config = EpochConfig::from_yaml(sample_yaml().as_bytes()).unwrap();
        assert_eq!(config.epoch, 5);
        config.validate().unwrap();
    }

    #[test]
    fn epoch_zero_without_genesis_fails_validation() {
        let mut config = EpochConfig::from_yaml(sample_yaml().as_bytes()).unwrap();
        config.epoch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn include_exclude_globs_filter_paths() {
        let matcher = ConfigMatcher::new(&["epoch-*.yaml".into()], &["epoch-bad*.yaml".into()]).unwrap();
        assert!(matcher.matches(Path::new("epoch-5.yaml")));
        assert!(!matcher.matches(Path::new("epoch-bad-5.yaml")));
        assert!(!matcher.matches(Path::new("other.yaml")));
    }
}
