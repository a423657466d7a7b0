//! Program derived addresses of the bonding curve program.
use crate::constants::{
    ASSOCIATED_TOKEN_PROGRAM_ID, BONDING_CURVE_SEED, GLOBAL_SEED, PUMP_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
};
use solana_sdk::pubkey::Pubkey;

/// Address of the global parameters account.
pub fn global_address() -> Pubkey {
    Pubkey::find_program_address(&[GLOBAL_SEED], &PUMP_PROGRAM_ID).0
}

/// Address of the bonding curve account of `mint`.
pub fn bonding_curve_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], &PUMP_PROGRAM_ID).0
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}
