pub mod chain;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod runner;

mod pool;
mod thread;


pub use chain::{ChainClient, WalletSource};
pub use config::{EngineConfig, RunnerConfig};
pub use engine::{EngineHandle, MiningEngine, MiningEvent, ProgressEvent};
pub use runner::{MultiWalletRunner, WalletReport, WalletStatus};
pub use thread::search;
