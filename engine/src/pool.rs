use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use shared::{
    errors::{MinerError, MinerResult},
    interaction::{Job, JobId, MiningRound, NonceRange, Solution, WorkerResult},
    types::WalletAddress,
};
use tokio::{sync::mpsc, time};
use tracing::*;

use crate::{
    config::EngineConfig,
    cursor::NonceCursor,
    engine::{MiningEvent, ProgressEvent},
    thread::{search, SearchFn, SearchWorker, WorkerEvent, WorkerHandle},
};

/// What the pool has to do after a worker message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// stale epoch, unknown job, or the round is already solved
    Ignored,
    /// hand this job to its worker
    Dispatch(Job),
    /// the worker stays idle, nothing left to allocate
    Parked(usize),
    /// the range failed too often and is given up, the worker stays idle
    Abandoned { worker: usize, range: NonceRange },
    Solved(Solution),
}

/// attempts per range before a failing search is given up
pub(crate) const MAX_RANGE_FAILURES: u32 = 3;

/// Bookkeeping of the round in flight. Knows nothing about threads.
pub(crate) struct RoundState {
    epoch: u64,
    round: MiningRound,
    bulk_size: u64,
    cursor: NonceCursor,
    live: HashMap<JobId, NonceRange>,
    failures: HashMap<NonceRange, u32>,
    seq: u64,
    solved: bool,
}

impl RoundState {
    pub fn new(epoch: u64, round: MiningRound, bulk_size: u64) -> Self {
        Self {
            epoch,
            round,
            bulk_size,
            cursor: NonceCursor::new(),
            live: HashMap::new(),
            failures: HashMap::new(),
            seq: 0,
            solved: false,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.position()
    }

    pub fn live_jobs(&self) -> usize {
        self.live.len()
    }

    fn is_live(&self, id: &JobId) -> bool {
        id.epoch == self.epoch && self.live.contains_key(id)
    }

    fn register(&mut self, worker: usize, range: NonceRange) -> Job {
        self.seq += 1;
        let id = JobId { epoch: self.epoch, worker, seq: self.seq };
        self.live.insert(id, range);
        Job::new(id, &self.round, range)
    }

    /// Reserve the next bulk for `worker`.
    pub fn issue(&mut self, worker: usize) -> Option<Job> {
        if self.solved {
            return None;
        }
        let range = self.cursor.reserve(self.bulk_size)?;
        Some(self.register(worker, range))
    }

    pub fn on_result(&mut self, result: WorkerResult) -> Outcome {
        let job_id = result.job_id();
        if self.solved || !self.is_live(&job_id) {
            trace!("drop {result:?}");
            return Outcome::Ignored;
        }
        self.live.remove(&job_id);

        match result {
            WorkerResult::Found { nonce, hash, .. } => {
                self.solved = true;
                Outcome::Solved(Solution {
                    nonce,
                    hash,
                    current_hash: self.round.current_hash,
                    signer: self.round.signer,
                    difficulty: self.round.difficulty,
                })
            }
            WorkerResult::Exhausted { .. } => match self.issue(job_id.worker) {
                Some(job) => Outcome::Dispatch(job),
                None => Outcome::Parked(job_id.worker),
            },
        }
    }

    /// The range of a failed job goes back out under a new id, so nothing is skipped.
    /// After `MAX_RANGE_FAILURES` attempts the range is abandoned and its worker parked.
    pub fn on_failure(&mut self, job_id: JobId) -> Outcome {
        if self.solved || !self.is_live(&job_id) {
            return Outcome::Ignored;
        }
        let Some(range) = self.live.remove(&job_id) else {
            return Outcome::Ignored;
        };

        let failures = self.failures.entry(range).or_insert(0);
        *failures += 1;
        if *failures >= MAX_RANGE_FAILURES {
            return Outcome::Abandoned { worker: job_id.worker, range };
        }
        Outcome::Dispatch(self.register(job_id.worker, range))
    }
}

/// Fixed set of search threads for one identity plus the round they work on.
pub(crate) struct WorkerPool {
    wallet: WalletAddress,
    config: EngineConfig,
    search: SearchFn,
    workers: Vec<WorkerHandle>,
    results: mpsc::UnboundedSender<WorkerEvent>,
    epoch: u64,
    state: Option<RoundState>,
    dispatched: u64,
    hashes: u64,
    last_report: Instant,
}

impl WorkerPool {
    pub fn new(
        wallet: WalletAddress,
        config: EngineConfig,
    ) -> MinerResult<(Self, mpsc::UnboundedReceiver<WorkerEvent>)> {
        Self::with_search(wallet, config, search)
    }

    pub fn with_search(
        wallet: WalletAddress,
        config: EngineConfig,
        search: SearchFn,
    ) -> MinerResult<(Self, mpsc::UnboundedReceiver<WorkerEvent>)> {
        config.validate()?;

        let (results, results_rx) = mpsc::unbounded_channel();
        let mut pool = Self {
            wallet,
            config,
            search,
            workers: Vec::new(),
            results,
            epoch: 0,
            state: None,
            dispatched: 0,
            hashes: 0,
            last_report: Instant::now(),
        };

        for index in 0..pool.config.threads {
            let worker = pool.spawn_worker(index)?;
            pool.workers.push(worker);
        }

        debug!("{} >> worker pool ready, threads: {}", wallet.short(), pool.config.threads);
        Ok((pool, results_rx))
    }

    fn spawn_worker(&self, index: usize) -> MinerResult<WorkerHandle> {
        let core = if self.config.pin_cores { Some(index % num_cpus::get().max(1)) } else { None };
        SearchWorker::spawn(index, core, self.search, self.results.clone())
            .map_err(|err| MinerError::Configuration(format!("spawn worker {index}: {err}")))
    }

    #[cfg(test)]
    pub fn state(&self) -> Option<&RoundState> {
        self.state.as_ref()
    }

    #[cfg(test)]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Start a new epoch for `round`. Jobs still running from the previous one finish on
    /// their own and are ignored when they report.
    pub fn begin_round(&mut self, round: MiningRound) -> u64 {
        self.epoch += 1;
        let mut state = RoundState::new(self.epoch, round, self.config.bulk_size);

        info!(
            "{} >> epoch {} current hash: {} difficulty: {}",
            self.wallet.short(),
            self.epoch,
            hex::encode(round.current_hash),
            round.difficulty
        );

        let jobs: Vec<_> = (0..self.workers.len()).filter_map(|w| state.issue(w)).collect();
        self.state = Some(state);
        for job in jobs {
            self.dispatch(job);
        }
        self.epoch
    }

    /// Send a job to its worker, replacing the worker if its thread is gone.
    fn dispatch(&mut self, job: Job) {
        let index = job.id.worker;
        self.dispatched += 1;

        let job = match self.workers[index].sender.send(job) {
            Ok(()) => return,
            Err(mpsc::error::SendError(job)) => job,
        };

        warn!("{} >> {}", self.wallet.short(), MinerError::WorkerFailed(index));
        if let Some(handle) = self.workers[index].handle.take() {
            if let Err(err) = handle.join() {
                error!("worker {index} panicked: {err:?}");
            }
        }

        match self.spawn_worker(index) {
            Ok(worker) => {
                self.workers[index] = worker;
                if self.workers[index].sender.send(job).is_err() {
                    error!("replacement worker {index} rejected {:?}", job.range);
                }
            }
            Err(err) => error!("{} >> {err}", self.wallet.short()),
        }
    }

    /// Apply one worker message, returns the solution when the round is won.
    pub fn handle(&mut self, event: WorkerEvent) -> Option<Solution> {
        let outcome = match (&mut self.state, event) {
            (None, _) => Outcome::Ignored,
            (Some(state), WorkerEvent::Result { result, hashes }) => {
                self.hashes += hashes;
                state.on_result(result)
            }
            (Some(state), WorkerEvent::Failed { job_id, reason }) => {
                warn!(
                    "{} >> {}",
                    self.wallet.short(),
                    MinerError::HashComputation { worker: job_id.worker, reason }
                );
                state.on_failure(job_id)
            }
        };

        match outcome {
            Outcome::Ignored => None,
            Outcome::Dispatch(job) => {
                self.dispatch(job);
                None
            }
            Outcome::Parked(worker) => {
                warn!("{} >> nonce space used up, worker {worker} idle", self.wallet.short());
                None
            }
            Outcome::Abandoned { worker, range } => {
                error!(
                    "{} >> give up [{}, {}) after {MAX_RANGE_FAILURES} failures, worker {worker} idle",
                    self.wallet.short(),
                    range.start,
                    range.end()
                );
                None
            }
            Outcome::Solved(solution) => {
                info!(
                    "{} >> found nonce {} hash {}",
                    self.wallet.short(),
                    solution.nonce,
                    hex::encode(solution.hash)
                );
                Some(solution)
            }
        }
    }

    /// true when the round is unsolved and nothing is left in flight
    fn space_exhausted(&self) -> bool {
        self.state.as_ref().map_or(false, |s| !s.is_solved() && s.live_jobs() == 0)
    }

    fn progress(&mut self) -> Option<ProgressEvent> {
        let elapsed = self.last_report.elapsed();
        let hashes = std::mem::take(&mut self.hashes);
        self.last_report = Instant::now();

        let state = self.state.as_ref().filter(|s| !s.is_solved())?;
        Some(ProgressEvent {
            wallet: self.wallet,
            epoch: state.epoch(),
            hashes,
            hashrate: hashrate(hashes, elapsed),
            cursor: state.cursor(),
        })
    }

    /// Orchestrator loop. Ends when the round channel or the event receiver is closed.
    pub async fn run(
        mut self,
        mut results: mpsc::UnboundedReceiver<WorkerEvent>,
        mut rounds: mpsc::UnboundedReceiver<MiningRound>,
        events: mpsc::UnboundedSender<MiningEvent>,
    ) {
        let mut ticker = time::interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let event = tokio::select! {
                round = rounds.recv() => match round {
                    Some(round) => {
                        let epoch = self.begin_round(round);
                        Some(MiningEvent::RoundStarted { epoch, round })
                    }
                    None => break,
                },
                Some(message) = results.recv() => {
                    let solution = self.handle(message);
                    match solution {
                        Some(solution) => Some(MiningEvent::Found(solution)),
                        None if self.space_exhausted() => {
                            let epoch = self.epoch;
                            self.state = None;
                            Some(MiningEvent::SpaceExhausted { epoch })
                        }
                        None => None,
                    }
                },
                _ = ticker.tick() => self.progress().map(MiningEvent::Progress),
            };

            if let Some(event) = event {
                if events.send(event).is_err() {
                    debug!("{} >> event receiver dropped", self.wallet.short());
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Close every job channel. Threads exit once their current job is done.
    pub fn shutdown(&mut self) {
        debug!(
            "{} >> worker pool shutting down, jobs dispatched: {}",
            self.wallet.short(),
            self.dispatched
        );
        self.state = None;
        self.workers.clear();
    }
}

fn hashrate(hashes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        hashes as f64 / secs
    } else {
        0.0
    }
}
