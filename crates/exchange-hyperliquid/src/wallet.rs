use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use std::str::FromStr;

/// Create a signing wallet from a private key (with or without 0x prefix).
///
/// # Errors
/// Returns error if the private key format is invalid.
pub fn wallet_from_private_key(private_key: &str) -> Result<LocalWallet> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);

    LocalWallet::from_str(key).context("Failed to create wallet from private key")
}

/// Loose shape check on a wallet address: 0x-prefixed, 40 hex chars.
#[must_use]
pub fn looks_like_address(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}
