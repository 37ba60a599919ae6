//! Risk-bounded position sizing.
//!
//! Pure functions: balance in, sized order out. No I/O, no clock, fully
//! deterministic, all arithmetic in `Decimal`.

use crate::connector::ExchangeKind;
use crate::credentials::Credentials;
use crate::error::RiskError;
use crate::signal::Signal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Notional may never exceed 95% of the leveraged balance.
const MAX_NOTIONAL_RATIO: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// How a subscriber's margin is chosen before risk capping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    /// A fixed dollar amount of margin per signal.
    Fixed,
    /// A percentage of the current account balance.
    Percentage,
}

/// Per-subscriber, per-channel sizing configuration.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub mode: RiskMode,
    /// Margin in quote currency when `mode` is `Fixed`.
    pub fixed_amount: Decimal,
    /// 0-100, applied to balance when `mode` is `Percentage`.
    pub percentage_of_balance: Decimal,
    /// 0-10, the hard cap on loss-at-stop as a fraction of balance.
    pub max_risk_percent: Decimal,
    pub exchange: ExchangeKind,
    pub credentials: Credentials,
}

/// Output of the risk engine. Derived, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedOrder {
    /// Margin committed after any scaling.
    pub margin: Decimal,
    pub leverage: u8,
    /// `margin * leverage`.
    pub notional: Decimal,
    /// Base-asset quantity, `notional / entry`.
    pub unit_size: Decimal,
    /// Set when the max-risk cap forced the margin down.
    pub risk_scaled: bool,
}

/// Turns balance + signal + settings into a bounded order size.
///
/// The central invariant: when a stop-loss is present, the expected loss at
/// the stop never exceeds `balance * max_risk_percent / 100`, no matter what
/// the raw margin and leverage would have risked.
///
/// # Errors
/// Returns `RiskError` when the account cannot trade at all: non-positive
/// or below-minimum balance, or a signal without a positive entry price.
pub fn size_order(
    balance: Decimal,
    signal: &Signal,
    settings: &RiskSettings,
    default_leverage: u8,
    min_balance: Decimal,
) -> Result<SizedOrder, RiskError> {
    if balance <= Decimal::ZERO {
        return Err(RiskError::NonPositiveBalance(balance));
    }
    if balance < min_balance {
        return Err(RiskError::BalanceBelowMinimum {
            balance,
            minimum: min_balance,
        });
    }

    let entry = signal.primary_entry().ok_or(RiskError::MissingEntryPrice)?;
    if entry <= Decimal::ZERO {
        return Err(RiskError::InvalidEntryPrice(entry));
    }

    let mut margin = match settings.mode {
        RiskMode::Fixed => settings.fixed_amount,
        RiskMode::Percentage => balance * settings.percentage_of_balance / Decimal::ONE_HUNDRED,
    };

    let leverage = signal.leverage.unwrap_or(default_leverage).max(1);
    let leverage_dec = Decimal::from(leverage);
    let mut notional = margin * leverage_dec;
    let mut risk_scaled = false;

    if let Some(stop) = signal.primary_stop() {
        if stop > Decimal::ZERO {
            let risk_distance = (entry - stop).abs() / entry;
            let expected_loss = margin * risk_distance * leverage_dec;
            let max_allowed_loss = balance * settings.max_risk_percent / Decimal::ONE_HUNDRED;

            if expected_loss > max_allowed_loss && expected_loss > Decimal::ZERO {
                let scale = max_allowed_loss / expected_loss;
                margin *= scale;
                notional = margin * leverage_dec;
                risk_scaled = true;
                tracing::warn!(
                    symbol = %signal.symbol,
                    %expected_loss,
                    %max_allowed_loss,
                    adjusted_margin = %margin,
                    "position scaled down to respect max risk"
                );
            }
        }
    }

    // Never commit more than 95% of the leveraged balance.
    let notional_cap = balance * leverage_dec * MAX_NOTIONAL_RATIO;
    if notional > notional_cap {
        notional = notional_cap;
        margin = notional / leverage_dec;
    }

    Ok(SizedOrder {
        margin,
        leverage,
        notional,
        unit_size: notional / entry,
        risk_scaled,
    })
}
