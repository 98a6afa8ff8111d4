//! Reference protocol modules for chainflow.
//!
//! - [`SwapModule`] / [`ReverseSwapModule`]: Uniswap V2 style router swaps
//! - [`AddLiquidityModule`] / [`RemoveLiquidityModule`]: V2 pool liquidity
//! - [`TransferModule`]: coin transfer to the wallet's pair address
//!
//! [`register_defaults`] wires every configured module into a
//! [`TaskRegistry`], including the forward/reverse pairings.

pub mod config;
pub mod liquidity;
pub mod router;
pub mod swap;
pub mod transfer;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::info;

use chainflow_chain::ChainResult;
use chainflow_core::{ModuleKey, OperationKind};
use chainflow_executor::TaskRegistry;

pub use config::{ModulesConfig, V2RouterConfig, TRANSFER_PROTOCOL};
pub use liquidity::{AddLiquidityModule, RemoveLiquidityModule};
pub use router::V2Router;
pub use swap::{ReverseSwapModule, SwapModule};
pub use transfer::TransferModule;

/// Register every configured module.
///
/// Per V2 router: `Swap` (reverse `ReverseSwap`), `AddLiquidity` (reverse
/// `RemoveLiquidity`), plus both reverse kinds as standalone tasks.
/// Fails if a configured address does not parse.
pub fn register_defaults(registry: &mut TaskRegistry, config: &ModulesConfig) -> ChainResult<()> {
    for router_config in &config.v2_routers {
        let router = Arc::new(V2Router::new(router_config)?);
        let protocol = router.protocol().to_string();
        let key = |kind| ModuleKey::new(protocol.clone(), kind);

        let (swap, reverse_swap) = (router.clone(), router.clone());
        let (add, remove) = (router.clone(), router.clone());
        registry
            .register(key(OperationKind::Swap), move || {
                Arc::new(SwapModule::new(swap.clone()))
            })
            .register(key(OperationKind::ReverseSwap), move || {
                Arc::new(ReverseSwapModule::new(reverse_swap.clone()))
            })
            .register(key(OperationKind::AddLiquidity), move || {
                Arc::new(AddLiquidityModule::new(add.clone()))
            })
            .register(key(OperationKind::RemoveLiquidity), move || {
                Arc::new(RemoveLiquidityModule::new(remove.clone()))
            })
            .register_reverse(key(OperationKind::Swap), key(OperationKind::ReverseSwap))
            .register_reverse(
                key(OperationKind::AddLiquidity),
                key(OperationKind::RemoveLiquidity),
            );
        info!(%protocol, router = %router.address(), "V2 router modules registered");
    }

    if config.transfer {
        registry.register(
            ModuleKey::new(TRANSFER_PROTOCOL, OperationKind::Transfer),
            || Arc::new(TransferModule),
        );
    }
    Ok(())
}
