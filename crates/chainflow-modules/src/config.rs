//! Module configuration.

use serde::{Deserialize, Serialize};

/// Protocol id of the transfer module.
pub const TRANSFER_PROTOCOL: &str = "transfer";

/// One deployment of a Uniswap V2 style router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2RouterConfig {
    /// Protocol id tasks use to select this router (e.g. "sushiswap").
    pub protocol: String,
    pub router: String,
    pub factory: String,
    /// Wrapped native coin used in paths for native legs.
    pub wrapped_native: String,
    /// Swap and liquidity deadline from now (seconds). Default: 1200.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_deadline_secs() -> u64 {
    1_200
}

/// Modules to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default)]
    pub v2_routers: Vec<V2RouterConfig>,
    /// Register the transfer module. Default: true.
    #[serde(default = "default_transfer")]
    pub transfer: bool,
}

fn default_transfer() -> bool {
    true
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            v2_routers: Vec::new(),
            transfer: default_transfer(),
        }
    }
}
