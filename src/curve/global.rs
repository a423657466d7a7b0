use super::{CurveError, CurveState};
use borsh::BorshDeserialize;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::pubkey::Pubkey;

/// Platform-wide parameters of the bonding curve program.
///
/// Fetched fresh for every operation and treated as read-only while quoting.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParameters {
    /// Whether the program has been initialized.
    pub initialized: bool,
    /// Program authority.
    #[serde_as(as = "DisplayFromStr")]
    pub authority: Pubkey,
    /// Account receiving trade fees.
    #[serde_as(as = "DisplayFromStr")]
    pub fee_recipient: Pubkey,
    /// Virtual token reserves a new curve starts with.
    pub initial_virtual_token_reserves: u64,
    /// Virtual SOL reserves a new curve starts with.
    pub initial_virtual_sol_reserves: u64,
    /// Real token reserves a new curve starts with.
    pub initial_real_token_reserves: u64,
    /// Token supply of every launched mint.
    pub token_total_supply: u64,
    /// Trade fee in basis points.
    pub fee_basis_points: u64,
}

#[derive(BorshDeserialize)]
struct GlobalAccountLayout {
    _discriminator: u64,
    initialized: bool,
    authority: [u8; 32],
    fee_recipient: [u8; 32],
    initial_virtual_token_reserves: u64,
    initial_virtual_sol_reserves: u64,
    initial_real_token_reserves: u64,
    token_total_supply: u64,
    fee_basis_points: u64,
}

impl GlobalParameters {
    /// Decodes the global account data.
    pub fn from_account_data(data: &[u8]) -> Result<Self, CurveError> {
        let mut buf = data;
        let layout = GlobalAccountLayout::deserialize(&mut buf)
            .map_err(|err| CurveError::InvalidAccountData(err.to_string()))?;

        Ok(Self {
            initialized: layout.initialized,
            authority: Pubkey::new_from_array(layout.authority),
            fee_recipient: Pubkey::new_from_array(layout.fee_recipient),
            initial_virtual_token_reserves: layout.initial_virtual_token_reserves,
            initial_virtual_sol_reserves: layout.initial_virtual_sol_reserves,
            initial_real_token_reserves: layout.initial_real_token_reserves,
            token_total_supply: layout.token_total_supply,
            fee_basis_points: layout.fee_basis_points,
        })
    }

    /// The state every curve is launched with.
    pub fn initial_curve(&self) -> CurveState {
        CurveState {
            virtual_token_reserves: self.initial_virtual_token_reserves,
            virtual_sol_reserves: self.initial_virtual_sol_reserves,
            real_token_reserves: self.initial_real_token_reserves,
            real_sol_reserves: 0,
            token_total_supply: self.token_total_supply,
            complete: false,
        }
    }

    /// Quotes a buy against a curve that does not exist yet, e.g. the dev buy bundled with a
    /// create.
    pub fn initial_buy_price(&self, sol_in: u64) -> Result<u64, CurveError> {
        self.initial_curve().quote_buy(sol_in)
    }
}
