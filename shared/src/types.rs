use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::errors::MinerError;

/// 32 byte signer identity, written as `0x` prefixed hex.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(pub [u8; 32]);

impl WalletAddress {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// shortened form for log lines
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}..{}", &full[..6], &full[full.len() - 4..])
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for WalletAddress {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(raw).map_err(|err| MinerError::InvalidAddress(format!("{s}: {err}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| MinerError::InvalidAddress(format!("{s}: {} bytes", v.len())))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = MinerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.to_string()
    }
}
