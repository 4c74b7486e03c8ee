//! Multi-record transactions over the account keyspace
//!
//! A [`LedgerTxn`] stages account changes in memory, guards every account it
//! read with the exact bytes it saw, and commits everything (plus any extra
//! guards and writes the caller adds) in one `write_batch_guarded` call. If
//! any record changed in between, the commit fails with a conflict and
//! nothing is written.

use chrono::NaiveDate;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use lib_storage::{BatchOp, Guard, StorageBackend};
use lib_types::UserId;

use crate::account::UserAccount;
use crate::codec::{decode, encode, user_key};
use crate::errors::LedgerResult;

struct StagedAccount {
    original: Option<Vec<u8>>,
    account: UserAccount,
}

pub struct LedgerTxn<'a, B: StorageBackend + ?Sized> {
    backend: &'a B,
    today: NaiveDate,
    now_secs: u64,
    guards: Vec<Guard>,
    ops: Vec<BatchOp>,
    accounts: BTreeMap<UserId, StagedAccount>,
}

impl<'a, B: StorageBackend + ?Sized> LedgerTxn<'a, B> {
    pub fn new(backend: &'a B, today: NaiveDate, now_secs: u64) -> Self {
        Self {
            backend,
            today,
            now_secs,
            guards: Vec::new(),
            ops: Vec::new(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn now_secs(&self) -> u64 {
        self.now_secs
    }

    /// Load (or lazily create) an account into the transaction.
    ///
    /// The daily counter is rolled on load. Loading the same user twice
    /// returns the staged copy.
    pub async fn account(&mut self, user_id: UserId) -> LedgerResult<&mut UserAccount> {
        let staged = match self.accounts.entry(user_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let key = user_key(user_id);
                let original = self.backend.get(&key).await?;
                let mut account = match &original {
                    Some(bytes) => decode::<UserAccount>(bytes)?,
                    None => UserAccount::new(user_id, self.today, self.now_secs),
                };
                account.roll_daily(self.today);
                self.guards.push(Guard::new(key, original.clone()));
                entry.insert(StagedAccount { original, account })
            }
        };
        Ok(&mut staged.account)
    }

    pub fn staged(&self, user_id: UserId) -> Option<&UserAccount> {
        self.accounts.get(&user_id).map(|s| &s.account)
    }

    /// Require `key` to still hold `expected` at commit time
    pub fn guard(&mut self, guard: Guard) {
        self.guards.push(guard);
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    /// Commit all staged accounts and extra operations atomically.
    ///
    /// Unchanged accounts are only guarded, not rewritten.
    pub async fn commit(mut self) -> LedgerResult<()> {
        for (user_id, staged) in &self.accounts {
            let encoded = encode(&staged.account)?;
            if staged.original.as_deref() != Some(encoded.as_slice()) {
                self.ops.push(BatchOp::Put {
                    key: user_key(*user_id),
                    value: encoded,
                });
            }
        }
        self.backend.write_batch_guarded(&self.guards, &self.ops).await?;
        Ok(())
    }
}
