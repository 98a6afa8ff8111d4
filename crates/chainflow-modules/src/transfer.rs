//! Transfer to the wallet's pair address.

use chainflow_chain::{abi, BoxFuture};
use chainflow_core::{ChainCall, FailureKind, TransactionPayloadData};
use chainflow_executor::{ModuleContext, ModuleContract, ModuleError, ModuleResult};

/// Send `coin_in` under the task's amount policy to the wallet's pair
/// address. Native coin moves as call value, tokens via `transfer`.
#[derive(Debug, Default)]
pub struct TransferModule;

impl ModuleContract for TransferModule {
    fn build_payload<'a>(
        &'a self,
        ctx: &'a ModuleContext,
    ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
        Box::pin(async move {
            let asset = &ctx.task.config().coin_in;
            let to = ctx.wallet.pair_address().ok_or_else(|| {
                ModuleError::new(
                    FailureKind::UnsupportedWallet,
                    format!("wallet {} has no pair address", ctx.wallet.id()),
                )
            })?;
            let amount = ctx.select_amount(asset).await?;

            let call = match &asset.address {
                None => {
                    abi::parse_address(to)
                        .map_err(|e| ModuleError::chain(FailureKind::UnsupportedWallet, e))?;
                    ChainCall::new(to, Vec::new()).with_value(amount.raw)
                }
                Some(token) => abi::transfer_call(token, to, amount.raw)
                    .map_err(|e| ModuleError::chain(FailureKind::UnsupportedWallet, e))?,
            };

            let description = format!("transfer {asset} to {to}");
            Ok(TransactionPayloadData::new(vec![call], amount.to_decimal()?, description))
        })
    }
}
