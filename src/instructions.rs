//! Instruction and transaction builders.
use crate::{
    constants::{
        ASSOCIATED_TOKEN_PROGRAM_ID, BUY_DISCRIMINATOR, PUMP_EVENT_AUTHORITY, PUMP_PROGRAM_ID,
        SELL_DISCRIMINATOR, TOKEN_PROGRAM_ID,
    },
    curve::pda,
    error::TransportError,
};
use borsh::BorshSerialize;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Keypair,
    system_instruction, system_program, sysvar,
    transaction::VersionedTransaction,
};

/// `CreateIdempotent` instruction tag of the associated token program.
const CREATE_IDEMPOTENT: u8 = 1;

#[derive(BorshSerialize)]
struct BuyArgs {
    amount: u64,
    max_sol_cost: u64,
}

#[derive(BorshSerialize)]
struct SellArgs {
    amount: u64,
    min_sol_output: u64,
}

/// Builds a signed legacy-message transaction.
pub fn build_transaction(
    instructions: &[Instruction],
    payer: &Pubkey,
    signers: &[&Keypair],
    blockhash: Hash,
) -> Result<VersionedTransaction, TransportError> {
    let message = Message::new_with_blockhash(instructions, Some(payer), &blockhash);
    VersionedTransaction::try_new(VersionedMessage::Legacy(message), signers)
        .map_err(|err| TransportError::other(format!("failed to sign transaction: {err}")))
}

/// One system transfer per recipient, all paid from `from`.
pub fn transfers(
    from: &Pubkey,
    recipients: impl IntoIterator<Item = (Pubkey, u64)>,
) -> Vec<Instruction> {
    recipients
        .into_iter()
        .map(|(to, lamports)| system_instruction::transfer(from, &to, lamports))
        .collect()
}

/// Creates the associated token account of `owner` for `mint` unless it already exists.
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(pda::associated_token_address(owner, mint), false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![CREATE_IDEMPOTENT],
    }
}

/// Bonding curve `buy`: receive exactly `amount` tokens paying at most `max_sol_cost` lamports.
pub fn buy(
    user: &Pubkey,
    mint: &Pubkey,
    fee_recipient: &Pubkey,
    amount: u64,
    max_sol_cost: u64,
) -> Result<Instruction, TransportError> {
    let data = encode(BUY_DISCRIMINATOR, &BuyArgs { amount, max_sol_cost })?;
    Ok(Instruction {
        program_id: PUMP_PROGRAM_ID,
        accounts: trade_accounts(user, mint, fee_recipient, sysvar::rent::ID),
        data,
    })
}

/// Bonding curve `sell`: sell `amount` tokens receiving at least `min_sol_output` lamports.
pub fn sell(
    user: &Pubkey,
    mint: &Pubkey,
    fee_recipient: &Pubkey,
    amount: u64,
    min_sol_output: u64,
) -> Result<Instruction, TransportError> {
    let data = encode(SELL_DISCRIMINATOR, &SellArgs { amount, min_sol_output })?;
    Ok(Instruction {
        program_id: PUMP_PROGRAM_ID,
        accounts: trade_accounts(user, mint, fee_recipient, ASSOCIATED_TOKEN_PROGRAM_ID),
        data,
    })
}

/// Accounts shared by `buy` and `sell`. They only differ in the program at position nine.
fn trade_accounts(
    user: &Pubkey,
    mint: &Pubkey,
    fee_recipient: &Pubkey,
    ninth: Pubkey,
) -> Vec<AccountMeta> {
    let bonding_curve = pda::bonding_curve_address(mint);
    vec![
        AccountMeta::new_readonly(pda::global_address(), false),
        AccountMeta::new(*fee_recipient, false),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(bonding_curve, false),
        AccountMeta::new(pda::associated_token_address(&bonding_curve, mint), false),
        AccountMeta::new(pda::associated_token_address(user, mint), false),
        AccountMeta::new(*user, true),
        AccountMeta::new_readonly(system_program::ID, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(ninth, false),
        AccountMeta::new_readonly(PUMP_EVENT_AUTHORITY, false),
        AccountMeta::new_readonly(PUMP_PROGRAM_ID, false),
    ]
}

/// Anchor instruction data: the discriminator followed by the borsh encoded arguments.
fn encode(
    discriminator: [u8; 8],
    args: &impl BorshSerialize,
) -> Result<Vec<u8>, TransportError> {
    let args = borsh::to_vec(args)
        .map_err(|err| TransportError::other(format!("failed to encode instruction: {err}")))?;
    Ok([discriminator.as_slice(), &args].concat())
}
