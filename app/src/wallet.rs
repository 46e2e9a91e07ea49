use std::{fs, path::PathBuf};

use engine::WalletSource;
use shared::{
    errors::{MinerError, MinerResult},
    types::WalletAddress,
};

/// One address per line. Blank lines and `#` comments are skipped.
pub struct FileWalletSource {
    path: PathBuf,
}

impl FileWalletSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WalletSource for FileWalletSource {
    fn load(&self) -> MinerResult<Vec<WalletAddress>> {
        let content = fs::read_to_string(&self.path).map_err(|err| {
            MinerError::Configuration(format!("read keys file {}: {err}", self.path.display()))
        })?;
        parse_wallets(&content)
    }
}

fn parse_wallets(content: &str) -> MinerResult<Vec<WalletAddress>> {
    let mut wallets = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let wallet: WalletAddress = line.parse()?;
        if !wallets.contains(&wallet) {
            wallets.push(wallet);
        }
    }
    Ok(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys_file() {
        let a = "11".repeat(32);
        let b = "22".repeat(32);
        let content = format!("# miners\n0x{a}\n\n  {b}  \n0x{a}\n");

        let wallets = parse_wallets(&content).unwrap();
        assert_eq!(wallets, vec![WalletAddress([0x11; 32]), WalletAddress([0x22; 32])]);
    }

    #[test]
    fn bad_line_fails_the_load() {
        let res = parse_wallets("0xdeadbeef\n");
        assert!(matches!(res, Err(MinerError::InvalidAddress(_))));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let res = FileWalletSource::new("./no-such-keys.txt").load();
        assert!(matches!(res, Err(MinerError::Configuration(_))));
    }
}
