use std::{path::PathBuf, sync::Arc};

use cfg_if::cfg_if;
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use engine::{
    ChainClient,
    MiningEngine,
    MultiWalletRunner,
    WalletReport,
    WalletSource,
    WalletStatus,
};
use shared::{
    log::init_log,
    types::WalletAddress,
    utils::{format_amount, TOKEN_DECIMALS},
};
use tracing::*;

use crate::{config::load_config_file, restful::ServerAPI, wallet::FileWalletSource};

mod config;
mod restful;
mod wallet;

cfg_if! {
    if #[cfg(feature = "build-version")] {
        include!(concat!(env!("OUT_DIR"), "/version.rs"));
    } else {
        pub const VERSION: &str = "unknown";
    }
}

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[arg(long, value_name = "FILE", default_value = "./config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mine with every configured wallet
    Mine(MineArgs),
    /// Show balance, account and lifetime stats of each wallet
    Profile(WalletArgs),
    /// Show global mining stats
    Stats,
}

#[derive(ClapArgs, Debug)]
struct WalletArgs {
    #[arg(long, help = "Mine with a single wallet address", conflicts_with = "keys_file")]
    address: Option<WalletAddress>,

    #[arg(long, value_name = "FILE", help = "File with one wallet address per line")]
    keys_file: Option<PathBuf>,
}

impl WalletArgs {
    fn load(&self) -> anyhow::Result<Vec<WalletAddress>> {
        let wallets = match (&self.address, &self.keys_file) {
            (Some(address), _) => vec![*address],
            (None, Some(path)) => FileWalletSource::new(path).load()?,
            (None, None) => FileWalletSource::new("./keys.txt").load()?,
        };
        if wallets.is_empty() {
            anyhow::bail!("no wallet configured");
        }
        Ok(wallets)
    }
}

#[derive(ClapArgs, Debug)]
struct MineArgs {
    #[command(flatten)]
    wallets: WalletArgs,

    #[arg(long, help = "Search threads per wallet. Defaults to the number of cores")]
    threads: Option<usize>,

    #[arg(long, help = "Nonces handed to a thread per job")]
    bulk_size: Option<u64>,

    #[arg(long, help = "Stop each wallet after this many accepted proofs")]
    max_solutions: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_log();

    let args = Args::parse();
    info!("version: {VERSION}");

    let cfg = load_config_file(&args.config)?;
    debug!("config: {cfg:?}");

    let api = Arc::new(ServerAPI::new(cfg.rpc.clone()));

    match args.command {
        Commands::Mine(mine) => {
            if !cfg.has_started(shared::timestamp()) {
                println!("{}", "Mining has not started yet".red());
                return Ok(());
            }

            let wallets = mine.wallets.load()?;
            let engine = MiningEngine::new(cfg.engine_config(mine.threads, mine.bulk_size));
            info!(
                "wallets: {} threads: {} bulk size: {}",
                wallets.len(),
                engine.config().threads,
                engine.config().bulk_size
            );

            let runner = MultiWalletRunner::new(api, engine, cfg.runner_config(mine.max_solutions))?;

            let shutdown = runner.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("ctrl-c received, stopping miners");
                    let _ = shutdown.send(());
                }
            });

            for report in runner.run(&wallets).await? {
                print_report(&report);
            }
        }
        Commands::Profile(wallets) => {
            for wallet in wallets.load()? {
                if let Err(err) = print_profile(&api, &wallet).await {
                    println!("{} {wallet}: {err}", "ERROR".bold().red());
                }
            }
        }
        Commands::Stats => {
            let stats = api.global_stats().await?;
            println!("{}", "Global stats".bold());
            println!("  total hashes:  {}", stats.total_hashes);
            println!("  total rewards: {}", format_amount(stats.total_rewards, TOKEN_DECIMALS));
            println!("  reward rate:   {}", format_amount(stats.reward_rate, TOKEN_DECIMALS));
            println!("  difficulty:    {}", stats.difficulty);
        }
    }

    Ok(())
}

fn print_report(report: &WalletReport) {
    match &report.status {
        WalletStatus::LowBalance { .. } => {
            println!("{} {report}", "Low balance".bold().red());
        }
        WalletStatus::Skipped(_) | WalletStatus::Failed(_) => {
            println!("{} {report}", "ERROR".bold().red());
        }
        WalletStatus::Finished { .. } => {
            println!("{} {report}", "DONE".bold().green());
        }
    }
}

async fn print_profile(api: &ServerAPI, wallet: &WalletAddress) -> anyhow::Result<()> {
    let balance = api.balance(wallet).await?;
    let stats = api.miner_stats(wallet).await?;

    println!("{}", wallet.to_string().bold());
    println!("  balance:       {}", format_amount(balance, TOKEN_DECIMALS));
    match api.account(wallet).await? {
        Some(account) => println!("  account:       {} (claims: {})", account.id, account.claims),
        None => println!("  account:       {}", "not created".yellow()),
    }
    println!("  total hashes:  {}", stats.total_hashes);
    println!("  total rewards: {}", format_amount(stats.total_rewards, TOKEN_DECIMALS));
    Ok(())
}
