use std::{
    panic::{self, AssertUnwindSafe},
    thread::JoinHandle,
};

use core_affinity::CoreId;
use shared::{
    hash::{is_valid_hash, ChainHasher},
    interaction::{Job, JobId, WorkerResult},
};
use tokio::sync::mpsc;
use tracing::*;

/// scan function run by every worker, swappable in tests
pub(crate) type SearchFn = fn(&Job) -> WorkerResult;

/// Scan `job.range` in order and stop at the first digest meeting the difficulty.
pub fn search(job: &Job) -> WorkerResult {
    let mut hasher = ChainHasher::new(&job.current_hash, &job.signer);
    let difficulty = job.difficulty as u32;

    let mut nonce = job.start_nonce();
    let mut count = 0;
    while count < job.nonce_range() {
        count += 1;
        let hash = hasher.hash(nonce);
        if is_valid_hash(&hash, difficulty) {
            return WorkerResult::Found { nonce, hash, job_id: job.id };
        }
        nonce += 1;
    }

    WorkerResult::Exhausted { last_nonce: job.range.end(), job_id: job.id }
}

/// hashes spent on a job, derived from its result
pub(crate) fn workload(job: &Job, result: &WorkerResult) -> u64 {
    match result {
        WorkerResult::Found { nonce, .. } => nonce - job.start_nonce() + 1,
        WorkerResult::Exhausted { .. } => job.nonce_range(),
    }
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Result { result: WorkerResult, hashes: u64 },
    Failed { job_id: JobId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Searching,
    AwaitingNext,
}

pub(crate) struct WorkerHandle {
    pub sender: mpsc::UnboundedSender<Job>,
    pub handle: Option<JoinHandle<()>>,
}

pub(crate) struct SearchWorker {
    index: usize,
    state: WorkerState,
    search: SearchFn,
    jobs: mpsc::UnboundedReceiver<Job>,
    results: mpsc::UnboundedSender<WorkerEvent>,
}

impl SearchWorker {
    pub fn spawn(
        index: usize,
        core: Option<usize>,
        search: SearchFn,
        results: mpsc::UnboundedSender<WorkerEvent>,
    ) -> std::io::Result<WorkerHandle> {
        let (sender, jobs) = mpsc::unbounded_channel();
        let worker = SearchWorker { index, state: WorkerState::Idle, search, jobs, results };

        let handle = std::thread::Builder::new()
            .name(format!("search-{index}"))
            .spawn(move || worker.run(core))?;

        Ok(WorkerHandle { sender, handle: Some(handle) })
    }

    fn run(mut self, core: Option<usize>) {
        if let Some(id) = core {
            // bound thread to core
            let _ = core_affinity::set_for_current(CoreId { id });
        }
        debug!("worker {} started", self.index);

        loop {
            let Some(job) = self.jobs.blocking_recv() else {
                debug!("worker {}: job channel closed", self.index);
                return;
            };

            trace!("worker {} {:?} -> searching {:?}", self.index, self.state, job.range);
            self.state = WorkerState::Searching;

            let search = self.search;
            let event = match panic::catch_unwind(AssertUnwindSafe(|| search(&job))) {
                Ok(result) => {
                    self.state = match result {
                        WorkerResult::Found { .. } => WorkerState::Idle,
                        WorkerResult::Exhausted { .. } => WorkerState::AwaitingNext,
                    };
                    WorkerEvent::Result { hashes: workload(&job, &result), result }
                }
                Err(payload) => {
                    self.state = WorkerState::Idle;
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("worker {}: search of {:?} failed: {reason}", self.index, job.range);
                    WorkerEvent::Failed { job_id: job.id, reason }
                }
            };

            if self.results.send(event).is_err() {
                debug!("worker {}: result channel closed", self.index);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::{
        hash::hash_chain,
        interaction::{MiningRound, NonceRange},
        types::WalletAddress,
    };

    use super::*;

    fn job(difficulty: u8, start: u64, length: u64) -> Job {
        let round = MiningRound::new([0; 32], WalletAddress([0; 32]), difficulty);
        Job::new(JobId { epoch: 1, worker: 0, seq: 0 }, &round, NonceRange::new(start, length))
    }

    #[test]
    fn pinned_end_to_end_vector() {
        let job = job(1, 0, 1_000_000);
        let result = search(&job);
        let WorkerResult::Found { nonce, hash, job_id } = result else {
            panic!("expected a solution, got {result:?}");
        };
        assert_eq!(nonce, 980);
        assert_eq!(
            hex::encode(hash),
            "00312e69dae696193e62a811d72ba61eaf676171a880d4839688ddd155355213"
        );
        assert_eq!(job_id, job.id);
        assert_eq!(workload(&job, &result), 981);

        // deterministic across runs
        assert_eq!(search(&job), result);
    }

    #[test]
    fn exhausted_reports_range_end() {
        // no solution in [0, 980)
        let job = job(1, 0, 980);
        assert_eq!(search(&job), WorkerResult::Exhausted { last_nonce: 980, job_id: job.id });
        assert_eq!(workload(&job, &search(&job)), 980);
    }

    #[test]
    fn found_nonce_lies_inside_range() {
        let job = job(1, 500, 1_000);
        match search(&job) {
            WorkerResult::Found { nonce, hash, .. } => {
                assert!(job.range.contains(nonce));
                assert_eq!(hash, hash_chain(&[0; 32], &[0; 32], nonce));
                assert_eq!(hash[0], 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_difficulty_takes_first_nonce() {
        let job = job(0, 42, 10);
        assert!(matches!(search(&job), WorkerResult::Found { nonce: 42, .. }));
    }

    #[test]
    fn empty_range_is_exhausted_immediately() {
        let job = job(0, 7, 0);
        assert_eq!(search(&job), WorkerResult::Exhausted { last_nonce: 7, job_id: job.id });
    }

    #[test]
    fn worker_is_reused_after_exhaustion() {
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let handle = SearchWorker::spawn(0, None, search, results_tx).unwrap();

        handle.sender.send(job(1, 0, 500)).unwrap();
        handle.sender.send(job(1, 500, 500)).unwrap();

        let first = results_rx.blocking_recv().unwrap();
        let second = results_rx.blocking_recv().unwrap();
        assert!(matches!(
            first,
            WorkerEvent::Result { result: WorkerResult::Exhausted { last_nonce: 500, .. }, hashes: 500 }
        ));
        assert!(matches!(
            second,
            WorkerEvent::Result { result: WorkerResult::Found { nonce: 980, .. }, hashes: 481 }
        ));

        drop(handle.sender);
        handle.handle.unwrap().join().unwrap();
    }

    #[test]
    fn panicking_search_is_reported_not_fatal() {
        fn broken(job: &Job) -> WorkerResult {
            if job.range.start == 0 {
                panic!("keccak exploded");
            }
            search(job)
        }

        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let handle = SearchWorker::spawn(3, None, broken, results_tx).unwrap();
        handle.sender.send(job(1, 0, 10)).unwrap();
        handle.sender.send(job(1, 900, 100)).unwrap();

        match results_rx.blocking_recv().unwrap() {
            WorkerEvent::Failed { reason, .. } => assert_eq!(reason, "keccak exploded"),
            other => panic!("unexpected {other:?}"),
        }
        // the same thread keeps serving jobs
        assert!(matches!(
            results_rx.blocking_recv().unwrap(),
            WorkerEvent::Result { result: WorkerResult::Found { nonce: 980, .. }, .. }
        ));
    }
}
