//! In-memory Ledger Store
//!
//! Same contract as the PostgreSQL backend. Transactions are serialized by a
//! single async mutex (stronger than SERIALIZABLE) and write to a working
//! copy that replaces the committed state only on `commit`; dropping an
//! unfinished transaction discards it.
//!
//! Faults can be injected per operation to exercise failure paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::LedgerError;
use super::models::{
    Account, AccountId, EXTERNAL_FUNDING_ACCOUNT, Entry, ExternalTransfer, ExternalTransferKey,
    ExternalTransferUpdate, NewExternalTransfer, Page, Transfer,
};
use super::status::ExternalTransferStatus;
use super::store::{LedgerStore, LedgerTx};
use crate::currency::Currency;

/// Operations that accept injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    AdjustBalance,
    CreateEntry,
    UpdateExternalTransferStatus,
}

#[derive(Debug, Clone, Copy)]
struct ArmedFault {
    /// Calls that pass before the first failure
    skip: usize,
    /// Failures still to deliver
    times: usize,
}

#[derive(Default)]
struct FaultRegistry {
    armed: Mutex<HashMap<FaultPoint, ArmedFault>>,
}

impl FaultRegistry {
    fn arm(&self, point: FaultPoint, skip: usize, times: usize) {
        let mut armed = self.armed.lock().unwrap_or_else(|p| p.into_inner());
        if times == 0 {
            armed.remove(&point);
        } else {
            armed.insert(point, ArmedFault { skip, times });
        }
    }

    fn check(&self, point: FaultPoint) -> Result<(), LedgerError> {
        let mut armed = self.armed.lock().unwrap_or_else(|p| p.into_inner());
        let Some(fault) = armed.get_mut(&point) else {
            return Ok(());
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        fault.times -= 1;
        if fault.times == 0 {
            armed.remove(&point);
        }
        Err(LedgerError::Transient(format!("injected fault at {:?}", point)))
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: BTreeMap<AccountId, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    external_transfers: BTreeMap<i64, ExternalTransfer>,
    last_account_id: i64,
    last_entry_id: i64,
    last_transfer_id: i64,
    last_external_id: i64,
}

impl LedgerState {
    fn account_exists(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<AsyncMutex<LedgerState>>,
    faults: Arc<FaultRegistry>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `point` with a transient error.
    /// `times == 0` disarms.
    pub fn inject_fault(&self, point: FaultPoint, times: usize) {
        self.faults.arm(point, 0, times);
    }

    /// Like [`inject_fault`](Self::inject_fault), but let `skip` calls pass first.
    pub fn inject_fault_after(&self, point: FaultPoint, skip: usize, times: usize) {
        self.faults.arm(point, skip, times);
    }

    /// Sum of all entry amounts for an account
    pub async fn entry_sum(&self, account_id: AccountId) -> i64 {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn transfer_count(&self) -> usize {
        self.state.lock().await.transfers.len()
    }

    pub async fn external_transfer_count(&self) -> usize {
        self.state.lock().await.external_transfers.len()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    /// Backdate `updated_at` of an external transfer, for staleness tests.
    pub async fn age_external_transfer(&self, id: i64, by: Duration) {
        let mut state = self.state.lock().await;
        if let Some(record) = state.external_transfers.get_mut(&id) {
            let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
            record.updated_at -= by;
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        self.faults.check(FaultPoint::Begin)?;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerTx {
            guard,
            working,
            faults: self.faults.clone(),
            finished: false,
        }))
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let state = self.state.lock().await;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError> {
        let state = self.state.lock().await;
        let owned: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        Ok(owned[page.range(owned.len())].to_vec())
    }

    async fn get_external_transfer(
        &self,
        key: &ExternalTransferKey,
    ) -> Result<ExternalTransfer, LedgerError> {
        let state = self.state.lock().await;
        let found = match key {
            ExternalTransferKey::Id(id) => state.external_transfers.get(id),
            ExternalTransferKey::Reference(reference) => state
                .external_transfers
                .values()
                .find(|t| &t.reference == reference),
        };
        found
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("external transfer {}", key)))
    }

    async fn list_external_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ExternalTransfer>, LedgerError> {
        let state = self.state.lock().await;
        let mut rows: Vec<ExternalTransfer> = state
            .external_transfers
            .values()
            .filter(|t| t.from_account_id == account_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |t| (t.created_at, t.id));
        Ok(rows[page.range(rows.len())].to_vec())
    }

    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, LedgerError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Entry> = state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |e| (e.created_at, e.id));
        Ok(rows[page.range(rows.len())].to_vec())
    }

    async fn list_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Transfer> = state
            .transfers
            .iter()
            .filter(|t| t.from_account_id == account_id || t.to_account_id == account_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |t| (t.created_at, t.id));
        Ok(rows[page.range(rows.len())].to_vec())
    }

    async fn find_stale_external_transfers(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<ExternalTransfer>, LedgerError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| LedgerError::Internal(e.to_string()))?;
        let state = self.state.lock().await;
        let mut rows: Vec<ExternalTransfer> = state
            .external_transfers
            .values()
            .filter(|t| !t.status.is_terminal() && t.updated_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|t| (t.updated_at, t.id));
        rows.truncate(limit);
        Ok(rows)
    }
}

struct MemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    faults: Arc<FaultRegistry>,
    finished: bool,
}

impl MemoryLedgerTx {
    fn state(&mut self) -> Result<&mut LedgerState, LedgerError> {
        if self.finished {
            return Err(LedgerError::Internal(
                "transaction already finished".to_string(),
            ));
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let state = self.state()?;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn create_account(
        &mut self,
        owner: &str,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let state = self.state()?;
        if state
            .accounts
            .values()
            .any(|a| a.owner == owner && a.currency == currency)
        {
            return Err(LedgerError::Conflict(format!(
                "owner {} already has a {} account",
                owner, currency
            )));
        }
        state.last_account_id += 1;
        let account = Account {
            id: state.last_account_id,
            owner: owner.to_string(),
            balance: 0,
            currency,
            created_at: Utc::now(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Account, LedgerError> {
        self.faults.check(FaultPoint::AdjustBalance)?;
        let state = self.state()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Internal(format!("balance overflow on account {}", id)))?;
        Ok(account.clone())
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: i64,
    ) -> Result<Entry, LedgerError> {
        self.faults.check(FaultPoint::CreateEntry)?;
        let state = self.state()?;
        if !state.account_exists(account_id) {
            return Err(LedgerError::Conflict(format!(
                "entry references missing account {}",
                account_id
            )));
        }
        state.last_entry_id += 1;
        let entry = Entry {
            id: state.last_entry_id,
            account_id,
            amount,
            created_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        let state = self.state()?;
        if from_account_id != EXTERNAL_FUNDING_ACCOUNT && !state.account_exists(from_account_id) {
            return Err(LedgerError::Conflict(format!(
                "transfer references missing account {}",
                from_account_id
            )));
        }
        if !state.account_exists(to_account_id) {
            return Err(LedgerError::Conflict(format!(
                "transfer references missing account {}",
                to_account_id
            )));
        }
        state.last_transfer_id += 1;
        let transfer = Transfer {
            id: state.last_transfer_id,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        state.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_external_transfer(
        &mut self,
        new: &NewExternalTransfer,
    ) -> Result<ExternalTransfer, LedgerError> {
        let state = self.state()?;
        if !state.account_exists(new.from_account_id) {
            return Err(LedgerError::Conflict(format!(
                "external transfer references missing account {}",
                new.from_account_id
            )));
        }
        if state
            .external_transfers
            .values()
            .any(|t| t.reference == new.reference)
        {
            return Err(LedgerError::Conflict(format!(
                "duplicate reference {}",
                new.reference
            )));
        }
        state.last_external_id += 1;
        let now = Utc::now();
        let record = ExternalTransfer {
            id: state.last_external_id,
            from_account_id: new.from_account_id,
            to_bank_code: new.to_bank_code.clone(),
            to_account_number: new.to_account_number.clone(),
            recipient_name: new.recipient_name.clone(),
            amount: new.amount,
            currency: new.currency,
            status: ExternalTransferStatus::Pending,
            reference: new.reference.clone(),
            description: new.description.clone(),
            transaction_id: None,
            transaction_fees: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.external_transfers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_external_transfer_status(
        &mut self,
        update: &ExternalTransferUpdate,
    ) -> Result<ExternalTransfer, LedgerError> {
        self.faults.check(FaultPoint::UpdateExternalTransferStatus)?;
        let state = self.state()?;
        let record = state
            .external_transfers
            .get_mut(&update.id)
            .ok_or_else(|| LedgerError::NotFound(format!("external transfer id={}", update.id)))?;

        if !record.status.can_transition_to(update.status) {
            return Err(LedgerError::Conflict(format!(
                "external transfer {} is {}, cannot move to {}",
                update.id, record.status, update.status
            )));
        }
        update.apply_to(record, Utc::now());
        Ok(record.clone())
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        self.state()?;
        *self.guard = std::mem::take(&mut self.working);
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LedgerError> {
        self.finished = true;
        Ok(())
    }
}
