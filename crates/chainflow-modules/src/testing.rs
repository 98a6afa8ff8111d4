//! Test fixtures: a fake V2 deployment answering `eth_call`s on a
//! `MockChainClient`.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use tokio_util::sync::CancellationToken;

use chainflow_chain::abi::parse_address;
use chainflow_chain::{ChainError, MockChainClient};
use chainflow_core::{Asset, ChainCall, Credential, Task, Wallet};
use chainflow_executor::{ExecutionLedger, ModuleContext};

use crate::config::V2RouterConfig;
use crate::router::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, V2Router};

pub const OWNER: &str = "0x00000000000000000000000000000000000000c1";
pub const PEER: &str = "0x00000000000000000000000000000000000000c2";
pub const ROUTER: &str = "0x00000000000000000000000000000000000000d1";
pub const FACTORY: &str = "0x00000000000000000000000000000000000000f1";
pub const WRAPPED: &str = "0x00000000000000000000000000000000000000ee";
pub const PAIR: &str = "0x00000000000000000000000000000000000000a9";

pub fn usdc() -> Asset {
    Asset::token("USDC", "0x00000000000000000000000000000000000000aa", 6)
}

pub fn weth() -> Asset {
    Asset::token("WETH", "0x00000000000000000000000000000000000000bb", 18)
}

pub fn eth() -> Asset {
    Asset::native("ETH", 18)
}

pub fn router_config() -> V2RouterConfig {
    V2RouterConfig {
        protocol: "v2".to_string(),
        router: ROUTER.to_string(),
        factory: FACTORY.to_string(),
        wrapped_native: WRAPPED.to_string(),
        deadline_secs: 600,
    }
}

pub fn router() -> Arc<V2Router> {
    Arc::new(V2Router::new(&router_config()).unwrap())
}

pub fn context(task: Arc<Task>, chain: Arc<MockChainClient>) -> ModuleContext {
    ModuleContext {
        task,
        wallet: Arc::new(Wallet::new(OWNER, Credential::new("k")).with_pair_address(PEER)),
        chain,
        ledger: Arc::new(ExecutionLedger::new()),
        cancel: CancellationToken::new(),
        retry_delay: Duration::ZERO,
    }
}

fn address(s: &str) -> Address {
    parse_address(s).unwrap()
}

/// Fake router, factory and pair.
///
/// Quotes `amount_in * rate`; the pair holds `reserve0` of `token0` and
/// `reserve1` of the other coin.
#[derive(Debug, Clone)]
pub struct FakeRouter {
    pub rate: u128,
    pub pair: Address,
    pub token0: Address,
    pub reserve0: u128,
    pub reserve1: u128,
    pub total_supply: u128,
}

impl FakeRouter {
    pub fn new(rate: u128) -> Self {
        Self {
            rate,
            pair: address(PAIR),
            token0: address(usdc().address.as_deref().unwrap()),
            reserve0: 1_000_000,
            reserve1: 2_000_000,
            total_supply: 100_000,
        }
    }

    pub fn install(self, chain: &MockChainClient) {
        chain.set_call_handler(move |call| self.answer(call));
    }

    fn answer(&self, call: &ChainCall) -> Result<Vec<u8>, ChainError> {
        let selector: [u8; 4] = call
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::Decode("short calldata".into()))?;
        let decode = |e: alloy::sol_types::Error| ChainError::Decode(e.to_string());

        if selector == IUniswapV2Router02::getAmountsOutCall::SELECTOR {
            let args = IUniswapV2Router02::getAmountsOutCall::abi_decode(&call.data, true)
                .map_err(decode)?;
            let out = args.amountIn * U256::from(self.rate);
            Ok(IUniswapV2Router02::getAmountsOutCall::abi_encode_returns(&(vec![
                args.amountIn,
                out,
            ],)))
        } else if selector == IUniswapV2Factory::getPairCall::SELECTOR {
            Ok(IUniswapV2Factory::getPairCall::abi_encode_returns(&(self.pair,)))
        } else if selector == IUniswapV2Pair::token0Call::SELECTOR {
            Ok(IUniswapV2Pair::token0Call::abi_encode_returns(&(self.token0,)))
        } else if selector == IUniswapV2Pair::getReservesCall::SELECTOR {
            Ok(IUniswapV2Pair::getReservesCall::abi_encode_returns(&(
                U256::from(self.reserve0),
                U256::from(self.reserve1),
                U256::ZERO,
            )))
        } else if selector == IUniswapV2Pair::totalSupplyCall::SELECTOR {
            Ok(IUniswapV2Pair::totalSupplyCall::abi_encode_returns(&(U256::from(
                self.total_supply,
            ),)))
        } else {
            Err(ChainError::Rpc {
                code: -32000,
                message: format!("execution reverted: unknown selector on {}", call.to),
            })
        }
    }
}
