use anyhow::Result;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Signature;
use serde_json::json;

/// Sign a Hyperliquid exchange action with the account wallet.
///
/// The signed message is the canonical JSON of `{action, nonce}`; the venue
/// recovers the signer address and checks it against the account.
///
/// # Errors
/// Returns error if signing fails.
pub async fn sign_action(
    wallet: &LocalWallet,
    action: &serde_json::Value,
    nonce: u64,
) -> Result<Signature> {
    let message = json!({
        "action": action,
        "nonce": nonce,
    });

    let message_str = serde_json::to_string(&message)?;
    let signature = wallet.sign_message(message_str.as_bytes()).await?;

    Ok(signature)
}

/// Hex encoding the venue expects for a signature.
#[must_use]
pub fn signature_to_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}
