//! Bonding curve pricing.
//!
//! The curve is a constant-product market maker over virtual reserves, with real reserves capping
//! how many tokens can actually leave the pool. All math is integer math over `u128`
//! intermediates; anything that does not fit back into `u64` is rejected instead of wrapped.

mod global;
pub use global::GlobalParameters;

pub mod pda;

use crate::constants::BASIS_POINTS_DENOMINATOR;
use borsh::BorshDeserialize;
use serde::{Deserialize, Serialize};

/// Errors returned by curve pricing and account decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    /// The curve has migrated and no longer accepts trades.
    #[error("bonding curve is complete")]
    CurveCompleted,
    /// An intermediate or final value did not fit.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    /// The account data could not be decoded.
    #[error("invalid account data: {0}")]
    InvalidAccountData(String),
}

/// On-chain state of a single bonding curve.
///
/// "Token" is the base asset being launched, "sol" is the quote asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveState {
    /// Virtual token reserves used for pricing.
    pub virtual_token_reserves: u64,
    /// Virtual SOL reserves used for pricing.
    pub virtual_sol_reserves: u64,
    /// Tokens that can actually be bought out of the pool.
    pub real_token_reserves: u64,
    /// SOL actually held by the pool.
    pub real_sol_reserves: u64,
    /// Total token supply.
    pub token_total_supply: u64,
    /// Whether the curve has completed.
    pub complete: bool,
}

/// Account layout of the curve as stored on chain.
#[derive(BorshDeserialize)]
struct CurveAccountLayout {
    _discriminator: u64,
    virtual_token_reserves: u64,
    virtual_sol_reserves: u64,
    real_token_reserves: u64,
    real_sol_reserves: u64,
    token_total_supply: u64,
    complete: bool,
}

impl CurveState {
    /// Decodes the curve from raw account data.
    ///
    /// Trailing bytes after the known layout are ignored, newer program versions append fields.
    pub fn from_account_data(data: &[u8]) -> Result<Self, CurveError> {
        let mut buf = data;
        let layout = CurveAccountLayout::deserialize(&mut buf)
            .map_err(|err| CurveError::InvalidAccountData(err.to_string()))?;

        Ok(Self {
            virtual_token_reserves: layout.virtual_token_reserves,
            virtual_sol_reserves: layout.virtual_sol_reserves,
            real_token_reserves: layout.real_token_reserves,
            real_sol_reserves: layout.real_sol_reserves,
            token_total_supply: layout.token_total_supply,
            complete: layout.complete,
        })
    }

    /// Returns the amount of tokens received for `sol_in` lamports.
    ///
    /// The post-trade token reserve is rounded up by one so the pool never hands out more than it
    /// virtually owns, and the result is capped at the real token reserves.
    pub fn quote_buy(&self, sol_in: u64) -> Result<u64, CurveError> {
        self.ensure_active()?;
        if sol_in == 0 {
            return Ok(0);
        }

        let virtual_sol = self.virtual_sol_reserves as u128;
        let virtual_token = self.virtual_token_reserves as u128;

        let k = virtual_sol.checked_mul(virtual_token).ok_or(CurveError::ArithmeticOverflow)?;
        let new_sol =
            virtual_sol.checked_add(sol_in as u128).ok_or(CurveError::ArithmeticOverflow)?;
        let new_token = (k / new_sol).checked_add(1).ok_or(CurveError::ArithmeticOverflow)?;

        // `k / new_sol + 1` can exceed the virtual reserve only for empty curves.
        let out = virtual_token.saturating_sub(new_token);

        Ok(out.min(self.real_token_reserves as u128) as u64)
    }

    /// Returns the lamports received for selling `tokens_in`, net of the platform fee.
    pub fn quote_sell(&self, tokens_in: u64, fee_basis_points: u64) -> Result<u64, CurveError> {
        self.ensure_active()?;
        if tokens_in == 0 {
            return Ok(0);
        }

        let gross = (tokens_in as u128)
            .checked_mul(self.virtual_sol_reserves as u128)
            .ok_or(CurveError::ArithmeticOverflow)?
            / (self.virtual_token_reserves as u128 + tokens_in as u128);
        let fee = gross
            .checked_mul(fee_basis_points as u128)
            .ok_or(CurveError::ArithmeticOverflow)?
            / BASIS_POINTS_DENOMINATOR;

        u64::try_from(gross.saturating_sub(fee)).map_err(|_| CurveError::ArithmeticOverflow)
    }

    /// Returns the market cap of the curve denominated in lamports.
    pub fn market_cap_sol(&self) -> Result<u64, CurveError> {
        if self.virtual_token_reserves == 0 {
            return Ok(0);
        }

        let cap = (self.token_total_supply as u128)
            .checked_mul(self.virtual_sol_reserves as u128)
            .ok_or(CurveError::ArithmeticOverflow)?
            / self.virtual_token_reserves as u128;
        u64::try_from(cap).map_err(|_| CurveError::ArithmeticOverflow)
    }

    fn ensure_active(&self) -> Result<(), CurveError> {
        if self.complete {
            return Err(CurveError::CurveCompleted);
        }
        Ok(())
    }
}

/// Maximum amount to pay on the buy side: `amount + amount * bps / 10000`.
pub fn slippage_ceiling(amount: u64, slippage_basis_points: u64) -> Result<u64, CurveError> {
    let delta = slippage_delta(amount, slippage_basis_points)?;
    u64::try_from(amount as u128 + delta).map_err(|_| CurveError::ArithmeticOverflow)
}

/// Minimum amount to accept on the sell side: `amount - amount * bps / 10000`.
///
/// Saturates at zero for slippage above 100%.
pub fn slippage_floor(amount: u64, slippage_basis_points: u64) -> Result<u64, CurveError> {
    let delta = slippage_delta(amount, slippage_basis_points)?;
    Ok((amount as u128).saturating_sub(delta) as u64)
}

fn slippage_delta(amount: u64, slippage_basis_points: u64) -> Result<u128, CurveError> {
    (amount as u128)
        .checked_mul(slippage_basis_points as u128)
        .map(|value| value / BASIS_POINTS_DENOMINATOR)
        .ok_or(CurveError::ArithmeticOverflow)
}
