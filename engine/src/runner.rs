use std::{fmt, sync::Arc};

use futures_util::future::join_all;
use shared::{
    errors::{MinerError, MinerResult},
    interaction::{MiningRound, Solution},
    types::WalletAddress,
    utils::{format_amount, format_hashrate, TOKEN_DECIMALS},
};
use tokio::{
    sync::broadcast,
    time::{self, Instant},
};
use tracing::*;

use crate::{
    chain::{ChainClient, WalletSource},
    config::RunnerConfig,
    engine::{EngineHandle, MiningEngine, MiningEvent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletStatus {
    /// balance under `min_balance`, the pool was never spawned
    LowBalance { balance: u64, required: u64 },
    /// any other pre-flight failure
    Skipped(String),
    Finished { accepted: u64, rejected: u64 },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WalletReport {
    pub wallet: WalletAddress,
    pub status: WalletStatus,
}

impl fmt::Display for WalletReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            WalletStatus::LowBalance { balance, required } => write!(
                f,
                "{} low balance: {} < {}",
                self.wallet,
                format_amount(*balance, TOKEN_DECIMALS),
                format_amount(*required, TOKEN_DECIMALS)
            ),
            WalletStatus::Skipped(reason) => write!(f, "{} skipped: {reason}", self.wallet),
            WalletStatus::Finished { accepted, rejected } => {
                write!(f, "{} accepted: {accepted} rejected: {rejected}", self.wallet)
            }
            WalletStatus::Failed(reason) => write!(f, "{} failed: {reason}", self.wallet),
        }
    }
}

/// Mines every wallet with its own engine. Wallets share nothing but the chain client.
pub struct MultiWalletRunner<C> {
    chain: Arc<C>,
    engine: MiningEngine,
    config: RunnerConfig,
    shutdown: broadcast::Sender<()>,
}

impl<C: ChainClient + 'static> MultiWalletRunner<C> {
    pub fn new(chain: Arc<C>, engine: MiningEngine, config: RunnerConfig) -> MinerResult<Self> {
        engine.config().validate()?;
        config.validate()?;
        let (shutdown, _) = broadcast::channel(1);
        Ok(Self { chain, engine, config, shutdown })
    }

    /// Sending on this stops every wallet after its current step.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Mine every wallet of `source` until it finishes, fails or shutdown is sent.
    pub async fn run<S>(&self, source: &S) -> MinerResult<Vec<WalletReport>>
    where
        S: WalletSource + ?Sized, {
        let wallets = source.load()?;

        let mut handlers = vec![];
        for wallet in wallets.iter().copied() {
            let miner = WalletMiner::new(
                wallet,
                self.chain.clone(),
                self.engine.clone(),
                self.config.clone(),
                self.shutdown.subscribe(),
            );
            handlers.push(tokio::spawn(miner.run()));
        }

        let reports = join_all(handlers)
            .await
            .into_iter()
            .zip(wallets)
            .map(|(res, wallet)| match res {
                Ok(report) => report,
                Err(err) => {
                    error!("{} >> miner task: {err}", wallet.short());
                    WalletReport { wallet, status: WalletStatus::Failed(err.to_string()) }
                }
            })
            .collect();
        Ok(reports)
    }
}

struct WalletMiner<C> {
    wallet: WalletAddress,
    chain: Arc<C>,
    engine: MiningEngine,
    config: RunnerConfig,
    shutdown: broadcast::Receiver<()>,
    stopping: bool,
    accepted: u64,
    rejected: u64,
}

impl<C: ChainClient> WalletMiner<C> {
    fn new(
        wallet: WalletAddress,
        chain: Arc<C>,
        engine: MiningEngine,
        config: RunnerConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self { wallet, chain, engine, config, shutdown, stopping: false, accepted: 0, rejected: 0 }
    }

    async fn run(mut self) -> WalletReport {
        let status = match self.preflight().await {
            Err(err) => {
                warn!("{} >> skip wallet: {err}", self.wallet.short());
                match err {
                    MinerError::InsufficientBalance { balance, required } => {
                        WalletStatus::LowBalance { balance, required }
                    }
                    other => WalletStatus::Skipped(other.to_string()),
                }
            }
            Ok(()) => match self.mine().await {
                Ok(()) => WalletStatus::Finished { accepted: self.accepted, rejected: self.rejected },
                Err(err) => {
                    error!("{} >> {err}", self.wallet.short());
                    WalletStatus::Failed(err.to_string())
                }
            },
        };
        WalletReport { wallet: self.wallet, status }
    }

    async fn preflight(&self) -> MinerResult<()> {
        let balance = self.chain.balance(&self.wallet).await?;
        if balance < self.config.min_balance {
            return Err(MinerError::InsufficientBalance {
                balance,
                required: self.config.min_balance,
            });
        }

        let account = self
            .chain
            .get_or_create_account(&self.wallet)
            .await
            .map_err(|err| MinerError::AccountUnavailable(err.to_string()))?;

        info!(
            "{} >> balance: {} account: {} claims: {}",
            self.wallet.short(),
            format_amount(balance, TOKEN_DECIMALS),
            account.id,
            account.claims
        );
        Ok(())
    }

    async fn mine(&mut self) -> MinerResult<()> {
        let Some(mut current) = self.fetch_round().await else {
            return Ok(());
        };

        let threads = self.engine.config().threads;
        let bulk_size = self.engine.config().bulk_size;
        let mut handle = self.engine.start(self.wallet, current, threads, bulk_size)?;

        let mut ticker = time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let res = loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("{} >> shutdown", self.wallet.short());
                    break Ok(());
                },
                event = handle.next_event() => {
                    let Some(event) = event else {
                        break Err(MinerError::EngineStopped);
                    };
                    match self.on_event(event, &handle, &current).await {
                        Ok(Some(round)) => current = round,
                        Ok(None) => {}
                        Err(err) => break Err(err),
                    }
                    if self.stopping {
                        break Ok(());
                    }
                    if self.done() {
                        info!("{} >> {} proofs accepted, stop", self.wallet.short(), self.accepted);
                        break Ok(());
                    }
                },
                _ = ticker.tick() => {
                    match self.chain.current_round(&self.wallet).await {
                        Ok(round) if round.supersedes(&current) => {
                            info!("{} >> round moved on, restart search", self.wallet.short());
                            if let Err(err) = handle.next_round(round) {
                                break Err(err);
                            }
                            current = round;
                        }
                        Ok(_) => {}
                        Err(err) => warn!("{} >> refresh round: {err}", self.wallet.short()),
                    }
                },
            }
        };

        handle.stop().await;
        res
    }

    fn done(&self) -> bool {
        self.config.max_solutions.map_or(false, |max| self.accepted >= max)
    }

    /// Returns the round handed to the engine, if any.
    async fn on_event(
        &mut self,
        event: MiningEvent,
        handle: &EngineHandle,
        current: &MiningRound,
    ) -> MinerResult<Option<MiningRound>> {
        match event {
            MiningEvent::RoundStarted { epoch, round } => {
                debug!("{} >> epoch {epoch} difficulty {}", self.wallet.short(), round.difficulty);
                Ok(None)
            }
            MiningEvent::Progress(progress) => {
                info!(
                    "{} >> hashrate: {} cursor: {}",
                    self.wallet.short(),
                    format_hashrate(progress.hashrate),
                    progress.cursor
                );
                Ok(None)
            }
            MiningEvent::Found(solution) => {
                let solved = solution.round();
                if solved.supersedes(current) {
                    // queued before the engine switched rounds
                    debug!(
                        "{} >> drop nonce {} of a replaced round",
                        self.wallet.short(),
                        solution.nonce
                    );
                    return Ok(None);
                }

                self.submit(&solution).await;
                if self.done() {
                    return Ok(None);
                }
                match self.await_next_round(&solved).await {
                    Some(round) => {
                        handle.next_round(round)?;
                        Ok(Some(round))
                    }
                    None => Ok(None),
                }
            }
            MiningEvent::SpaceExhausted { epoch } => {
                warn!("{} >> epoch {epoch} searched without a solution", self.wallet.short());
                if !self.pause().await {
                    return Ok(None);
                }
                match self.fetch_round().await {
                    Some(round) => {
                        handle.next_round(round)?;
                        Ok(Some(round))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    async fn submit(&mut self, solution: &Solution) {
        match self.chain.submit_proof(solution).await {
            Ok(receipt) => {
                self.accepted += 1;
                info!(
                    "{} >> proof accepted, digest: {} reward: {}",
                    self.wallet.short(),
                    receipt.digest,
                    format_amount(receipt.reward, TOKEN_DECIMALS)
                );
            }
            Err(err) => {
                self.rejected += 1;
                let err = match err {
                    err @ MinerError::SubmissionRejected(_) => err,
                    other => MinerError::SubmissionRejected(other.to_string()),
                };
                warn!("{} >> {err}", self.wallet.short());
            }
        }
    }

    /// Poll until the chain moves past `solved`. A solved round is never searched again,
    /// the engine would only find the same nonce. `None` on shutdown.
    async fn await_next_round(&mut self, solved: &MiningRound) -> Option<MiningRound> {
        let mut notice = Instant::now();
        loop {
            match self.chain.current_round(&self.wallet).await {
                Ok(round) if round.supersedes(solved) => return Some(round),
                Ok(_) if notice.elapsed() >= self.config.round_wait => {
                    info!("{} >> waiting for the next round", self.wallet.short());
                    notice = Instant::now();
                }
                Ok(_) => {}
                Err(err) => warn!("{} >> fetch round: {err}", self.wallet.short()),
            }
            if !self.pause().await {
                return None;
            }
        }
    }

    /// Keeps asking until the chain answers. `None` on shutdown.
    async fn fetch_round(&mut self) -> Option<MiningRound> {
        loop {
            match self.chain.current_round(&self.wallet).await {
                Ok(round) => return Some(round),
                Err(err) => warn!("{} >> fetch round: {err}", self.wallet.short()),
            }
            if !self.pause().await {
                return None;
            }
        }
    }

    /// false when shutdown was requested while waiting
    async fn pause(&mut self) -> bool {
        tokio::select! {
            _ = self.shutdown.recv() => {
                self.stopping = true;
                false
            },
            _ = time::sleep(self.config.retry_delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tests::{engine_config, runner_config, FakeChain};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn found_for_replaced_round_is_dropped() {
        let wallet = WalletAddress([3; 32]);
        let chain = Arc::new(FakeChain::new(&[(wallet, 100)]));
        let engine = MiningEngine::new(engine_config(1, 10_000));
        let (shutdown, _) = broadcast::channel(1);
        let mut miner = WalletMiner::new(
            wallet,
            chain.clone(),
            engine.clone(),
            runner_config(1),
            shutdown.subscribe(),
        );

        let current = MiningRound::new([7; 32], wallet, 8);
        let handle = engine.start(wallet, current, 1, 10_000).unwrap();

        let stale = Solution {
            current_hash: [1; 32],
            signer: wallet,
            nonce: 42,
            hash: [0; 32],
            difficulty: 8,
        };
        let res = tokio::time::timeout(
            Duration::from_secs(5),
            miner.on_event(MiningEvent::Found(stale), &handle, &current),
        )
        .await
        .unwrap();

        assert!(matches!(res, Ok(None)));
        assert_eq!((miner.accepted, miner.rejected), (0, 0));
        assert!(chain.proofs_of(&wallet).is_empty());
        handle.stop().await;
    }
}
