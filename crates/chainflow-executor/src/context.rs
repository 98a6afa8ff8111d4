//! Run context.
//!
//! Explicit dependencies of a run: configuration, ledger, registry,
//! collaborators and the event sink. Passed to every component instead of
//! process-wide state.

use std::sync::Arc;

use chainflow_chain::{ChainClientFactory, DynGasOracle, DynProxyProvider, StaticProxyProvider};

use crate::config::EngineConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::events::{DynEventSink, NoopSink};
use crate::gas_gate::GasGate;
use crate::ledger::ExecutionLedger;
use crate::registry::TaskRegistry;

#[derive(Clone)]
pub struct RunContext {
    pub config: EngineConfig,
    pub ledger: Arc<ExecutionLedger>,
    pub registry: Arc<TaskRegistry>,
    pub chain_factory: Arc<dyn ChainClientFactory>,
    pub gas_oracle: Option<DynGasOracle>,
    pub proxy_provider: DynProxyProvider,
    pub sink: DynEventSink,
}

impl RunContext {
    /// Context with a fresh ledger, URL-checking proxy provider and no sink.
    pub fn new(
        config: EngineConfig,
        registry: TaskRegistry,
        chain_factory: Arc<dyn ChainClientFactory>,
    ) -> Self {
        Self {
            config,
            ledger: Arc::new(ExecutionLedger::new()),
            registry: Arc::new(registry),
            chain_factory,
            gas_oracle: None,
            proxy_provider: Arc::new(StaticProxyProvider),
            sink: Arc::new(NoopSink),
        }
    }

    #[must_use]
    pub fn with_gas_oracle(mut self, oracle: DynGasOracle) -> Self {
        self.gas_oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn with_proxy_provider(mut self, provider: DynProxyProvider) -> Self {
        self.proxy_provider = provider;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: DynEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Gas gate for the configured target, if any.
    pub fn gas_gate(&self) -> ExecutorResult<Option<GasGate>> {
        match (&self.config.gas, &self.gas_oracle) {
            (None, _) => Ok(None),
            (Some(gas), Some(oracle)) => Ok(Some(GasGate::new(oracle.clone(), gas.clone()))),
            (Some(_), None) => Err(ExecutorError::InvalidConfig(
                "gas gate configured without a gas price oracle".to_string(),
            )),
        }
    }
}
