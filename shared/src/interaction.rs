use serde::{Deserialize, Serialize};

use crate::{hash::Digest, types::WalletAddress};

/// One search target. Replaced wholesale whenever the chain head or difficulty moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningRound {
    pub current_hash: [u8; 32],
    pub signer: WalletAddress,
    pub difficulty: u8,
}

impl MiningRound {
    pub fn new(current_hash: [u8; 32], signer: WalletAddress, difficulty: u8) -> Self {
        Self { current_hash, signer, difficulty }
    }

    /// true when `other` needs a fresh epoch
    pub fn supersedes(&self, other: &MiningRound) -> bool {
        self.current_hash != other.current_hash || self.difficulty != other.difficulty
    }
}

/// `[start, start + length)` of the nonce space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceRange {
    pub start: u64,
    pub length: u64,
}

impl NonceRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// one past the last nonce of the range
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn contains(&self, nonce: u64) -> bool {
        nonce >= self.start && nonce < self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub epoch: u64,
    pub worker: usize,
    pub seq: u64,
}

/// work order for a single search worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub current_hash: [u8; 32],
    pub signer: [u8; 32],
    pub difficulty: u8,
    pub range: NonceRange,
}

impl Job {
    pub fn new(id: JobId, round: &MiningRound, range: NonceRange) -> Self {
        Self {
            id,
            current_hash: round.current_hash,
            signer: round.signer.0,
            difficulty: round.difficulty,
            range,
        }
    }

    pub fn start_nonce(&self) -> u64 {
        self.range.start
    }

    pub fn nonce_range(&self) -> u64 {
        self.range.length
    }
}

/// Exactly one of these is produced per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerResult {
    Found { nonce: u64, hash: Digest, job_id: JobId },
    Exhausted { last_nonce: u64, job_id: JobId },
}

impl WorkerResult {
    pub fn job_id(&self) -> JobId {
        match self {
            WorkerResult::Found { job_id, .. } | WorkerResult::Exhausted { job_id, .. } => *job_id,
        }
    }
}

/// what gets handed to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub nonce: u64,
    pub hash: Digest,
    pub current_hash: [u8; 32],
    pub signer: WalletAddress,
    pub difficulty: u8,
}

impl Solution {
    /// the round this solution was found for
    pub fn round(&self) -> MiningRound {
        MiningRound::new(self.current_hash, self.signer, self.difficulty)
    }
}

// gateway payloads

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RestfulResponse<T> {
    pub code: i32,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> RestfulResponse<T> {
    pub fn success(data: T) -> Self {
        RestfulResponse { code: 200, data: Some(data), message: None }
    }

    pub fn error(message: String, code: i32) -> Self {
        RestfulResponse { code, data: None, message: Some(message) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddressRequest {
    pub address: WalletAddress,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoundResponse {
    pub current_hash: [u8; 32],
    pub difficulty: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProofReceipt {
    pub digest: String,
    pub reward: u64,
}

/// on chain miner account of one wallet
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountHandle {
    pub id: String,
    pub owner: WalletAddress,
    pub claims: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MinerStats {
    pub total_hashes: u64,
    pub total_rewards: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_hashes: u64,
    pub total_rewards: u64,
    pub reward_rate: u64,
    pub difficulty: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds() {
        let range = NonceRange::new(100, 50);
        assert_eq!(range.end(), 150);
        assert!(range.contains(100));
        assert!(range.contains(149));
        assert!(!range.contains(150));
        assert!(!range.contains(99));
    }

    #[test]
    fn round_supersedes_on_hash_or_difficulty() {
        let signer = WalletAddress([3; 32]);
        let round = MiningRound::new([1; 32], signer, 2);
        assert!(!round.supersedes(&round));
        assert!(round.supersedes(&MiningRound::new([2; 32], signer, 2)));
        assert!(round.supersedes(&MiningRound::new([1; 32], signer, 3)));
    }

    #[test]
    fn solution_keeps_u64_nonce_in_json() {
        let solution = Solution {
            nonce: u64::MAX - 1,
            hash: [0; 32],
            current_hash: [5; 32],
            signer: WalletAddress([6; 32]),
            difficulty: 1,
        };
        let json = serde_json::to_string(&solution).unwrap();
        assert!(json.contains("\"nonce\":18446744073709551614"));
        let back: Solution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, solution);
        assert_eq!(back.round(), MiningRound::new([5; 32], WalletAddress([6; 32]), 1));
    }
}
