use shared::{
    errors::{MinerError, MinerResult},
    hash::MAX_DIFFICULTY,
    interaction::{MiningRound, Solution},
    types::WalletAddress,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::*;

use crate::{config::EngineConfig, pool::WorkerPool};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub wallet: WalletAddress,
    pub epoch: u64,
    /// hashes since the previous report
    pub hashes: u64,
    pub hashrate: f64,
    /// next unallocated nonce
    pub cursor: u64,
}

#[derive(Debug, Clone)]
pub enum MiningEvent {
    RoundStarted { epoch: u64, round: MiningRound },
    Found(Solution),
    Progress(ProgressEvent),
    /// every nonce of the round was searched without a hit
    SpaceExhausted { epoch: u64 },
}

/// Entry point used by the runner and the CLI.
#[derive(Debug, Clone, Default)]
pub struct MiningEngine {
    config: EngineConfig,
}

impl MiningEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn a worker pool for `identity` and start searching `round` right away.
    /// Must be called inside a tokio runtime.
    pub fn start(
        &self,
        identity: WalletAddress,
        round: MiningRound,
        threads: usize,
        bulk_size: u64,
    ) -> MinerResult<EngineHandle> {
        let config = EngineConfig { threads, bulk_size, ..self.config.clone() };
        validate_round(&identity, &round)?;
        let (pool, results) = WorkerPool::new(identity, config)?;
        Ok(EngineHandle::spawn(identity, round, pool, results))
    }
}

fn validate_round(identity: &WalletAddress, round: &MiningRound) -> MinerResult<()> {
    if round.difficulty > MAX_DIFFICULTY {
        return Err(MinerError::Configuration(format!(
            "difficulty {} exceeds {MAX_DIFFICULTY}",
            round.difficulty
        )));
    }
    if round.signer != *identity {
        return Err(MinerError::Configuration(format!(
            "round signer {} does not match {identity}",
            round.signer
        )));
    }
    Ok(())
}

/// Running engine of one identity.
pub struct EngineHandle {
    identity: WalletAddress,
    rounds: mpsc::UnboundedSender<MiningRound>,
    events: mpsc::UnboundedReceiver<MiningEvent>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub(crate) fn spawn(
        identity: WalletAddress,
        round: MiningRound,
        pool: WorkerPool,
        results: mpsc::UnboundedReceiver<crate::thread::WorkerEvent>,
    ) -> Self {
        let (rounds, rounds_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        // the receiver is alive, the first round cannot be lost
        let _ = rounds.send(round);
        let task = tokio::spawn(pool.run(results, rounds_rx, events_tx));

        Self { identity, rounds, events, task }
    }

    pub fn identity(&self) -> &WalletAddress {
        &self.identity
    }

    /// Supply the next round. Supersedes whatever is being searched.
    pub fn next_round(&self, round: MiningRound) -> MinerResult<()> {
        if round.signer != self.identity {
            return Err(MinerError::Configuration(format!(
                "round signer {} does not match {}",
                round.signer, self.identity
            )));
        }
        self.rounds.send(round).map_err(|_| MinerError::EngineStopped)
    }

    /// `None` once the engine has stopped.
    pub async fn next_event(&mut self) -> Option<MiningEvent> {
        self.events.recv().await
    }

    pub async fn stop(self) {
        let EngineHandle { identity, rounds, events, task } = self;
        drop(rounds);
        drop(events);
        if let Err(err) = task.await {
            error!("{} >> engine task: {err}", identity.short());
        }
    }
}
