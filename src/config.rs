//! Per-scope configuration surface.
//!
//! A scope can be configured from container init parameters (`authflow.*` keys), from a JSON
//! file, and finally from environment variables, in that order of precedence from low to high.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const PARAM_AUTHENTICATOR: &str = "authflow.authenticator.class";
pub const PARAM_STORE_FACTORY: &str = "authflow.principal-store.factory";
pub const PARAM_DELEGATE: &str = "authflow.delegate";
pub const PARAM_IS_DELEGATE: &str = "authflow.is-delegate";
pub const PARAM_CROSS_CONTEXT: &str = "authflow.cross-context";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Catalog name of the authenticator strategy.
    #[serde(default)]
    pub authenticator: Option<String>,
    /// Catalog name of the principal-store factory.
    #[serde(default)]
    pub principal_store_factory: Option<String>,
    /// Context path of another scope whose authenticator is borrowed.
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub is_delegate: bool,
    /// Explicit cross-context switch; derived from `delegate`/`is_delegate` when unset.
    #[serde(default)]
    pub cross_context: Option<bool>,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(v: &str) -> Option<String> {
    let t = v.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

impl ScopeConfig {
    pub fn with_authenticator(name: &str) -> Self {
        Self { authenticator: Some(name.to_string()), ..Default::default() }
    }

    pub fn delegating_to(scope: &str) -> Self {
        Self { delegate: Some(scope.to_string()), ..Default::default() }
    }

    /// Build from container init parameters. Unknown keys are ignored.
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut cfg = ScopeConfig::default();
        for (k, v) in params {
            match k {
                PARAM_AUTHENTICATOR => cfg.authenticator = non_empty(v),
                PARAM_STORE_FACTORY => cfg.principal_store_factory = non_empty(v),
                PARAM_DELEGATE => cfg.delegate = non_empty(v),
                PARAM_IS_DELEGATE => cfg.is_delegate = parse_bool(v).unwrap_or(false),
                PARAM_CROSS_CONTEXT => cfg.cross_context = parse_bool(v),
                _ => {}
            }
        }
        cfg
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read scope config: {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid scope config JSON in {}", path.display()))?;
        Ok(cfg)
    }

    /// Override fields from `<PREFIX>_AUTHENTICATOR`, `<PREFIX>_STORE_FACTORY`,
    /// `<PREFIX>_DELEGATE`, `<PREFIX>_IS_DELEGATE` and `<PREFIX>_CROSS_CONTEXT`.
    pub fn apply_env(&mut self, prefix: &str) {
        let var = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();
        if let Some(v) = var("AUTHENTICATOR") { self.authenticator = non_empty(&v); }
        if let Some(v) = var("STORE_FACTORY") { self.principal_store_factory = non_empty(&v); }
        if let Some(v) = var("DELEGATE") { self.delegate = non_empty(&v); }
        if let Some(b) = var("IS_DELEGATE").as_deref().and_then(parse_bool) { self.is_delegate = b; }
        if let Some(b) = var("CROSS_CONTEXT").as_deref().and_then(parse_bool) { self.cross_context = Some(b); }
    }

    pub fn resolves_cross_context(&self) -> bool {
        self.cross_context.unwrap_or(self.delegate.is_some() || self.is_delegate)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Idle lifetime of a correlation; every access slides it.
    #[serde(default = "BridgeSettings::default_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on live correlations; least recently used entries go first.
    #[serde(default = "BridgeSettings::default_capacity")]
    pub capacity: usize,
    /// Run an opportunistic sweep after this many accesses.
    #[serde(default = "BridgeSettings::default_sweep_every")]
    pub sweep_every: u64,
}

impl BridgeSettings {
    fn default_ttl_secs() -> u64 { 30 * 60 }
    fn default_capacity() -> usize { 10_000 }
    fn default_sweep_every() -> u64 { 100 }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
            capacity: Self::default_capacity(),
            sweep_every: Self::default_sweep_every(),
        }
    }
}

/// Whole-container configuration: bridge settings plus one entry per application scope,
/// keyed by context path.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeConfig>,
}

impl ContainerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read container config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid container config JSON in {}", path.display()))
    }
}
