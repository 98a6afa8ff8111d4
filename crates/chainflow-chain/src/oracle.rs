//! Gas price oracle and proxy provider interfaces.

use std::sync::Arc;

use crate::client::BoxFuture;
use crate::error::{ChainError, ChainResult};

/// Source of the current gas price.
pub trait GasPriceOracle: Send + Sync {
    /// Current gas price in wei.
    fn gas_price_wei(&self) -> BoxFuture<'_, ChainResult<u128>>;
}

/// Arc wrapper for GasPriceOracle trait objects.
pub type DynGasOracle = Arc<dyn GasPriceOracle>;

/// Validates the outbound route of a wallet.
pub trait ProxyProvider: Send + Sync {
    /// Validate a proxy URL. Failure is fatal for the wallet's run.
    fn validate<'a>(&'a self, proxy: &'a str) -> BoxFuture<'a, ChainResult<()>>;
}

/// Arc wrapper for ProxyProvider trait objects.
pub type DynProxyProvider = Arc<dyn ProxyProvider>;

/// Proxy provider that checks the proxy URL is well formed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProxyProvider;

impl ProxyProvider for StaticProxyProvider {
    fn validate<'a>(&'a self, proxy: &'a str) -> BoxFuture<'a, ChainResult<()>> {
        Box::pin(async move {
            reqwest::Proxy::all(proxy)
                .map(|_| ())
                .map_err(|e| ChainError::InvalidProxy(format!("{proxy}: {e}")))
        })
    }
}
