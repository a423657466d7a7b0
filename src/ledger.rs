//! Deduplicated in-memory view of participant accounts.
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::{collections::HashMap, fmt};
use tracing::warn;

/// A wallet record as supplied by the caller.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    /// Base58 encoded 64 byte secret key.
    pub secret_key: String,
    /// Requested amount in lamports.
    #[serde(default)]
    pub amount: u64,
}

impl RawAccount {
    /// Creates a new record.
    pub fn new(secret_key: impl Into<String>, amount: u64) -> Self {
        Self { secret_key: secret_key.into(), amount }
    }

    /// Creates a record from a keypair.
    pub fn from_keypair(keypair: &Keypair, amount: u64) -> Self {
        Self::new(keypair.to_base58_string(), amount)
    }
}

impl fmt::Debug for RawAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAccount")
            .field("secret_key", &"<redacted>")
            .field("amount", &self.amount)
            .finish()
    }
}

/// A single participant of an operation.
pub struct AccountEntry {
    /// Address derived from the keypair. Unique within a ledger.
    pub address: Pubkey,
    /// Signing key of the account.
    pub keypair: Keypair,
    /// Amount in lamports to move to or from this account.
    pub requested_amount: u64,
}

impl fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountEntry")
            .field("address", &self.address)
            .field("requested_amount", &self.requested_amount)
            .finish_non_exhaustive()
    }
}

/// Decodes a base58 secret key.
pub fn decode_keypair(secret_key: &str) -> Option<Keypair> {
    let bytes = bs58::decode(secret_key.trim()).into_vec().ok()?;
    Keypair::from_bytes(&bytes).ok()
}

/// Participant accounts of one operation, unique by address, in first-appearance order.
#[derive(Debug, Default)]
pub struct AccountLedger {
    entries: Vec<AccountEntry>,
}

impl AccountLedger {
    /// Builds the ledger from raw wallet records.
    ///
    /// Records resolving to the same address are merged by summing their amounts.
    pub fn build(raw: Vec<RawAccount>) -> Result<Self, LedgerError> {
        let mut entries: Vec<AccountEntry> = Vec::with_capacity(raw.len());
        let mut positions: HashMap<Pubkey, usize> = HashMap::with_capacity(raw.len());

        for (index, account) in raw.into_iter().enumerate() {
            let keypair = decode_keypair(&account.secret_key)
                .ok_or(LedgerError::InvalidSecretKey { index })?;
            let address = keypair.pubkey();

            if let Some(&position) = positions.get(&address) {
                let entry = &mut entries[position];
                entry.requested_amount = entry
                    .requested_amount
                    .checked_add(account.amount)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
                warn!(
                    %address,
                    index,
                    merged_amount = entry.requested_amount,
                    "Duplicate wallet, merging amounts"
                );
                continue;
            }

            positions.insert(address, entries.len());
            entries.push(AccountEntry { address, keypair, requested_amount: account.amount });
        }

        Ok(Self { entries })
    }

    /// Keeps only the entries whose balance is above `min_reserve` and sets their requested amount
    /// to everything above the reserve.
    ///
    /// Entries without a known balance are dropped.
    pub fn filter_above_threshold(
        self,
        balances: &HashMap<Pubkey, u64>,
        min_reserve: u64,
    ) -> Result<Self, LedgerError> {
        let entries: Vec<_> = self
            .entries
            .into_iter()
            .filter_map(|mut entry| {
                let balance = *balances.get(&entry.address)?;
                if balance <= min_reserve {
                    return None;
                }
                entry.requested_amount = balance - min_reserve;
                Some(entry)
            })
            .collect();

        if entries.is_empty() {
            return Err(LedgerError::NoAccountsEligible);
        }

        Ok(Self { entries })
    }

    /// Sets the same requested amount on every entry.
    pub fn with_uniform_amount(mut self, amount: u64) -> Self {
        for entry in &mut self.entries {
            entry.requested_amount = amount;
        }
        self
    }

    /// Number of unique accounts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in ledger order.
    pub fn entries(&self) -> &[AccountEntry] {
        &self.entries
    }

    /// Addresses in ledger order.
    pub fn addresses(&self) -> impl Iterator<Item = Pubkey> + '_ {
        self.entries.iter().map(|entry| entry.address)
    }

    /// Sum of all requested amounts, `None` on overflow.
    pub fn total_requested(&self) -> Option<u64> {
        self.entries.iter().try_fold(0u64, |acc, entry| acc.checked_add(entry.requested_amount))
    }

    /// Consumes the ledger.
    pub fn into_entries(self) -> Vec<AccountEntry> {
        self.entries
    }
}
