// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states:
//
//   Active ──commit──> Committed
//     │  └──set_rollback_only──> MarkedRollback ──rollback──> RolledBack
//     └──rollback──> RolledBack
//
// A transaction whose timeout has elapsed is treated as MarkedRollback.
//
// ============================================================================

use super::TransactionStatus;
use crate::core::{ManagerError, ManagerResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and may commit
    Active,

    /// Transaction can only end in rollback
    MarkedRollback,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been rolled back
    RolledBack,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::MarkedRollback => write!(f, "MARKED_ROLLBACK"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// A transaction tracked by the in-memory manager
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,

    state: TransactionState,

    /// `None` means the transaction never expires
    timeout: Option<Duration>,

    /// Detached from every context by `suspend`
    suspended: bool,

    start_time: Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, timeout: Option<Duration>) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            timeout,
            suspended: false,
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub(crate) fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Get transaction duration
    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.timeout
            .map(|timeout| self.start_time.elapsed() >= timeout)
            .unwrap_or(false)
    }

    /// Status as reported to the coordinator. Expiry counts as rollback-only.
    pub fn status(&self) -> TransactionStatus {
        match self.state {
            TransactionState::Active if self.is_expired() => TransactionStatus::MarkedRollback,
            TransactionState::Active => TransactionStatus::Active,
            TransactionState::MarkedRollback => TransactionStatus::MarkedRollback,
            TransactionState::Committed | TransactionState::RolledBack => {
                TransactionStatus::NoTransaction
            }
        }
    }

    /// # Errors
    /// Returns error if transaction already ended
    pub fn mark_rollback_only(&mut self) -> ManagerResult<()> {
        if self.state.is_terminal() {
            return Err(ManagerError::Other(format!(
                "Cannot mark rollback-only: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::MarkedRollback;
        Ok(())
    }

    /// Mark transaction as committed.
    ///
    /// A rollback-only or expired transaction is rolled back instead and the
    /// call fails.
    pub fn commit(&mut self) -> ManagerResult<()> {
        match self.state {
            TransactionState::Active if self.is_expired() => {
                self.state = TransactionState::RolledBack;
                Err(ManagerError::TimedOut(self.id.to_string()))
            }
            TransactionState::Active => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            TransactionState::MarkedRollback => {
                self.state = TransactionState::RolledBack;
                Err(ManagerError::RolledBack(self.id.to_string()))
            }
            _ => Err(ManagerError::Other(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            ))),
        }
    }

    pub fn rollback(&mut self) -> ManagerResult<()> {
        if self.state.is_terminal() {
            return Err(ManagerError::Other(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = Transaction::new(TransactionId::new(), None);

        assert_eq!(txn.state(), TransactionState::Active);
        assert_eq!(txn.status(), TransactionStatus::Active);
        assert!(!txn.state().is_terminal());

        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(txn.status(), TransactionStatus::NoTransaction);
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = Transaction::new(TransactionId::new(), None);

        txn.commit().unwrap();
        assert!(txn.commit().is_err());
    }

    #[test]
    fn test_commit_of_rollback_only_rolls_back() {
        let mut txn = Transaction::new(TransactionId::new(), None);
        txn.mark_rollback_only().unwrap();
        assert_eq!(txn.status(), TransactionStatus::MarkedRollback);

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, ManagerError::RolledBack(_)));
        assert_eq!(txn.state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_expired_transaction_reports_rollback_only() {
        let mut txn = Transaction::new(TransactionId::new(), Some(Duration::ZERO));
        assert!(txn.is_expired());
        assert_eq!(txn.status(), TransactionStatus::MarkedRollback);
        assert!(matches!(txn.commit(), Err(ManagerError::TimedOut(_))));
    }

    #[test]
    fn test_cannot_mark_after_rollback() {
        let mut txn = Transaction::new(TransactionId::new(), None);
        txn.rollback().unwrap();
        assert!(txn.mark_rollback_only().is_err());
        assert!(txn.rollback().is_err());
    }
}
