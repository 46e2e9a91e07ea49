use async_trait::async_trait;
use shared::{
    errors::MinerResult,
    interaction::{AccountHandle, MiningRound, ProofReceipt, Solution},
    types::WalletAddress,
};

/// Ledger the runner mines against.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// round the ledger expects `identity` to solve next
    async fn current_round(&self, identity: &WalletAddress) -> MinerResult<MiningRound>;

    /// Explicit rejections come back as `MinerError::SubmissionRejected`.
    async fn submit_proof(&self, solution: &Solution) -> MinerResult<ProofReceipt>;

    async fn get_or_create_account(&self, identity: &WalletAddress) -> MinerResult<AccountHandle>;

    /// spendable balance in base units
    async fn balance(&self, identity: &WalletAddress) -> MinerResult<u64>;
}

pub trait WalletSource {
    fn load(&self) -> MinerResult<Vec<WalletAddress>>;
}

impl WalletSource for Vec<WalletAddress> {
    fn load(&self) -> MinerResult<Vec<WalletAddress>> {
        Ok(self.clone())
    }
}
