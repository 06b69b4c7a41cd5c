// src/rpc.rs
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::entry_point::EntryPoint;
use crate::error::PaymasterError;
use crate::execution::{HandleOpsReport, OpOutcome};
use crate::gas::required_prefund;
use crate::ledger::DepositInfo;
use crate::paymaster::PaymasterSigner;
use crate::types::{BlockEnv, PaymasterResponse, UserOperation};
use crate::validation::SimulationResult;

fn rpc_error(e: impl std::fmt::Display) -> ErrorObjectOwned {
    error!("RPC request failed: {}", e);
    ErrorObjectOwned::owned(-32000, e.to_string(), None::<()>)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[rpc(server, namespace = "entrypoint")]
pub trait EntryPointRpc {
    #[method(name = "handleOps")]
    async fn handle_ops(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
    ) -> RpcResult<HandleOpsReport>;

    #[method(name = "simulateValidation")]
    async fn simulate_validation(&self, user_op: UserOperation) -> RpcResult<SimulationResult>;

    #[method(name = "simulateHandleOp")]
    async fn simulate_handle_op(&self, user_op: UserOperation) -> RpcResult<OpOutcome>;

    #[method(name = "getUserOpHash")]
    async fn get_user_op_hash(&self, user_op: UserOperation) -> RpcResult<H256>;

    #[method(name = "getSenderAddress")]
    async fn get_sender_address(&self, init_code: Bytes) -> RpcResult<Address>;

    #[method(name = "depositTo")]
    async fn deposit_to(&self, account: Address, amount: U256) -> RpcResult<U256>;

    #[method(name = "withdrawTo")]
    async fn withdraw_to(
        &self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> RpcResult<()>;

    #[method(name = "addStake")]
    async fn add_stake(
        &self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u64,
    ) -> RpcResult<U256>;

    #[method(name = "unlockStake")]
    async fn unlock_stake(&self, account: Address) -> RpcResult<u64>;

    #[method(name = "withdrawStake")]
    async fn withdraw_stake(&self, account: Address, withdraw_address: Address) -> RpcResult<U256>;

    #[method(name = "getDepositInfo")]
    async fn get_deposit_info(&self, account: Address) -> RpcResult<DepositInfo>;

    #[method(name = "balanceOf")]
    async fn balance_of(&self, account: Address) -> RpcResult<U256>;
}

#[rpc(server, namespace = "pm")]
pub trait PaymasterRpc {
    /// Requests the paymaster to sponsor a user operation
    #[method(name = "sponsorUserOperation")]
    async fn sponsor(&self, user_op: UserOperation) -> RpcResult<PaymasterResponse>;
}

/// The engine shared by every RPC handler. One mutator at a time.
#[derive(Debug, Clone)]
pub struct SharedEntryPoint {
    engine: Arc<Mutex<EntryPoint>>,
    base_fee: U256,
}

impl SharedEntryPoint {
    pub fn new(engine: EntryPoint, base_fee: U256) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            base_fee,
        }
    }

    /// Locks the engine and moves it to the current block.
    pub async fn lock(&self) -> MutexGuard<'_, EntryPoint> {
        let mut engine = self.engine.lock().await;
        engine.set_block(BlockEnv {
            timestamp: now(),
            base_fee: self.base_fee,
        });
        engine
    }

    async fn snapshot(&self) -> EntryPoint {
        self.lock().await.snapshot()
    }
}

pub struct EntryPointRpcImpl {
    entry_point: SharedEntryPoint,
}

impl EntryPointRpcImpl {
    pub fn new(entry_point: SharedEntryPoint) -> Self {
        Self { entry_point }
    }
}

#[async_trait]
impl EntryPointRpcServer for EntryPointRpcImpl {
    async fn handle_ops(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
    ) -> RpcResult<HandleOpsReport> {
        debug!("Received batch of {} ops", ops.len());
        let mut engine = self.entry_point.lock().await;
        let report = engine.handle_ops(&ops, beneficiary).map_err(rpc_error)?;
        engine.drain_events();
        Ok(report)
    }

    async fn simulate_validation(&self, user_op: UserOperation) -> RpcResult<SimulationResult> {
        let snapshot = self.entry_point.snapshot().await;
        Ok(snapshot.simulate_validation(&user_op))
    }

    async fn simulate_handle_op(&self, user_op: UserOperation) -> RpcResult<OpOutcome> {
        let snapshot = self.entry_point.snapshot().await;
        Ok(snapshot.simulate_handle_op(&user_op))
    }

    async fn get_user_op_hash(&self, user_op: UserOperation) -> RpcResult<H256> {
        Ok(self.entry_point.lock().await.get_user_op_hash(&user_op))
    }

    async fn get_sender_address(&self, init_code: Bytes) -> RpcResult<Address> {
        let engine = self.entry_point.lock().await;
        Ok(engine.get_sender_address(&init_code).map_err(rpc_error)?)
    }

    async fn deposit_to(&self, account: Address, amount: U256) -> RpcResult<U256> {
        let mut engine = self.entry_point.lock().await;
        Ok(engine.deposit_to(account, amount).map_err(rpc_error)?)
    }

    async fn withdraw_to(
        &self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> RpcResult<()> {
        let mut engine = self.entry_point.lock().await;
        engine
            .withdraw_to(account, withdraw_address, amount)
            .map_err(rpc_error)?;
        Ok(())
    }

    async fn add_stake(
        &self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u64,
    ) -> RpcResult<U256> {
        let mut engine = self.entry_point.lock().await;
        let total_staked = engine
            .add_stake(account, amount, unstake_delay_sec)
            .map_err(rpc_error)?;
        Ok(total_staked)
    }

    async fn unlock_stake(&self, account: Address) -> RpcResult<u64> {
        let mut engine = self.entry_point.lock().await;
        Ok(engine.unlock_stake(account).map_err(rpc_error)?)
    }

    async fn withdraw_stake(&self, account: Address, withdraw_address: Address) -> RpcResult<U256> {
        let mut engine = self.entry_point.lock().await;
        let amount = engine
            .withdraw_stake(account, withdraw_address)
            .map_err(rpc_error)?;
        Ok(amount)
    }

    async fn get_deposit_info(&self, account: Address) -> RpcResult<DepositInfo> {
        Ok(self.entry_point.lock().await.get_deposit_info(account))
    }

    async fn balance_of(&self, account: Address) -> RpcResult<U256> {
        Ok(self.entry_point.lock().await.balance_of(account))
    }
}

pub struct PaymasterRpcImpl {
    entry_point: SharedEntryPoint,
    signer: Arc<PaymasterSigner>,
}

impl PaymasterRpcImpl {
    pub fn new(entry_point: SharedEntryPoint, signer: Arc<PaymasterSigner>) -> Self {
        Self {
            entry_point,
            signer,
        }
    }

    /// Refuses operations the paymaster's deposit could not cover.
    async fn check_paymaster_balance(&self, user_op: &UserOperation) -> Result<(), PaymasterError> {
        let paymaster = self.signer.paymaster_address;
        let sponsored = UserOperation {
            paymaster_and_data: Bytes::from(paymaster.as_bytes().to_vec()),
            ..user_op.clone()
        };
        let engine = self.entry_point.lock().await;
        let max_cost = required_prefund(&sponsored, &engine.fee_params())
            .map_err(|e| PaymasterError::InvalidUserOperation(e.to_string()))?;
        let deposit = engine.balance_of(paymaster);
        if deposit < max_cost {
            return Err(PaymasterError::InsufficientFunds {
                required: max_cost,
                available: deposit,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymasterRpcServer for PaymasterRpcImpl {
    async fn sponsor(&self, user_op: UserOperation) -> RpcResult<PaymasterResponse> {
        debug!("Received sponsor request for sender: {:?}", user_op.sender);

        self.check_paymaster_balance(&user_op)
            .await
            .map_err(rpc_error)?;
        match self.signer.sign_user_operation(&user_op, now()).await {
            Ok(response) => {
                info!("Successfully sponsored operation for {:?}", user_op.sender);
                Ok(response)
            }
            Err(e) => Err(rpc_error(format!("Paymaster error: {}", e)).into()),
        }
    }
}

/// Builds the module served by the binary: the `entrypoint` namespace, plus
/// `pm` when a sponsor key is configured.
pub fn build_module(
    entry_point: SharedEntryPoint,
    signer: Option<Arc<PaymasterSigner>>,
) -> anyhow::Result<RpcModule<()>> {
    let mut module = RpcModule::new(());
    module.merge(EntryPointRpcImpl::new(entry_point.clone()).into_rpc())?;
    if let Some(signer) = signer {
        module.merge(PaymasterRpcImpl::new(entry_point, signer).into_rpc())?;
    }
    Ok(module)
}
