// ============================================================================
// In-Memory Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId, TransactionManager, TransactionState, TransactionStatus};
use crate::core::{ContextId, ManagerError, ManagerResult};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory manager configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Timeout applied when `begin` is called with zero seconds.
    /// Zero means transactions never expire.
    #[serde(default)]
    pub default_timeout_secs: u64,
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default transaction timeout
    pub fn default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    fn resolve_timeout(&self, requested_secs: u64) -> Option<Duration> {
        match requested_secs {
            0 if self.default_timeout_secs == 0 => None,
            0 => Some(Duration::from_secs(self.default_timeout_secs)),
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Transaction manager keeping every transaction in process memory.
///
/// Lock order is always `bindings` before `transactions`.
pub struct InMemoryTransactionManager {
    config: ManagerConfig,

    // Live transactions only; commit and rollback remove them.
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,

    // Which transaction each execution context currently runs in.
    bindings: Arc<RwLock<HashMap<ContextId, TransactionId>>>,
}

impl Default for InMemoryTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            config,
            transactions: Arc::new(RwLock::new(HashMap::new())),
            bindings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub async fn get_transaction_info(&self, txn_id: TransactionId) -> Option<TransactionInfo> {
        let transactions = self.transactions.read().await;
        transactions.get(&txn_id).map(|txn| TransactionInfo {
            id: txn.id(),
            state: txn.state(),
            suspended: txn.is_suspended(),
            timeout: txn.timeout(),
            duration: txn.duration(),
        })
    }

    /// Number of transactions that have not ended yet (bound or suspended)
    pub async fn live_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    /// Unbind the context's transaction, apply `end` to it and forget it.
    /// The transaction is dropped even when `end` fails.
    async fn end_bound<F>(&self, ctx: ContextId, end: F) -> ManagerResult<TransactionId>
    where
        F: FnOnce(&mut Transaction) -> ManagerResult<()> + Send,
    {
        let mut bindings = self.bindings.write().await;
        let txn_id = bindings
            .remove(&ctx)
            .ok_or_else(|| ManagerError::NotBound(ctx.to_string()))?;

        let mut transactions = self.transactions.write().await;
        let mut transaction = transactions
            .remove(&txn_id)
            .ok_or_else(|| ManagerError::UnknownTransaction(txn_id.to_string()))?;

        end(&mut transaction)?;
        Ok(txn_id)
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    type Handle = TransactionId;

    async fn begin(&self, ctx: ContextId, timeout_secs: u64) -> ManagerResult<TransactionId> {
        let mut bindings = self.bindings.write().await;
        if let Some(bound) = bindings.get(&ctx) {
            return Err(ManagerError::AlreadyBound(format!("{} ({})", ctx, bound)));
        }

        let txn_id = TransactionId::new();
        let transaction = Transaction::new(txn_id, self.config.resolve_timeout(timeout_secs));

        let mut transactions = self.transactions.write().await;
        transactions.insert(txn_id, transaction);
        bindings.insert(ctx, txn_id);

        debug!("Began {} on {}", txn_id, ctx);
        Ok(txn_id)
    }

    async fn commit(&self, ctx: ContextId) -> ManagerResult<()> {
        let txn_id = self.end_bound(ctx, |txn| txn.commit()).await?;
        debug!("Committed {} on {}", txn_id, ctx);
        Ok(())
    }

    async fn rollback(&self, ctx: ContextId) -> ManagerResult<()> {
        let txn_id = self.end_bound(ctx, |txn| txn.rollback()).await?;
        debug!("Rolled back {} on {}", txn_id, ctx);
        Ok(())
    }

    async fn set_rollback_only(&self, ctx: ContextId) -> ManagerResult<()> {
        let bindings = self.bindings.read().await;
        let txn_id = bindings
            .get(&ctx)
            .copied()
            .ok_or_else(|| ManagerError::NotBound(ctx.to_string()))?;

        let mut transactions = self.transactions.write().await;
        transactions
            .get_mut(&txn_id)
            .ok_or_else(|| ManagerError::UnknownTransaction(txn_id.to_string()))?
            .mark_rollback_only()
    }

    async fn suspend(&self, ctx: ContextId) -> ManagerResult<TransactionId> {
        let mut bindings = self.bindings.write().await;
        let txn_id = bindings
            .remove(&ctx)
            .ok_or_else(|| ManagerError::NotBound(ctx.to_string()))?;

        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&txn_id) {
            Some(txn) => txn.set_suspended(true),
            None => warn!("Suspended {} on {} but it is not tracked", txn_id, ctx),
        }

        debug!("Suspended {} on {}", txn_id, ctx);
        Ok(txn_id)
    }

    async fn resume(&self, ctx: ContextId, handle: TransactionId) -> ManagerResult<()> {
        let mut bindings = self.bindings.write().await;
        if let Some(bound) = bindings.get(&ctx) {
            return Err(ManagerError::AlreadyBound(format!("{} ({})", ctx, bound)));
        }

        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&handle)
            .ok_or_else(|| ManagerError::UnknownTransaction(handle.to_string()))?;

        if !transaction.is_suspended() || transaction.state().is_terminal() {
            return Err(ManagerError::NotSuspended(handle.to_string()));
        }

        transaction.set_suspended(false);
        bindings.insert(ctx, handle);

        debug!("Resumed {} on {}", handle, ctx);
        Ok(())
    }

    async fn current(&self, ctx: ContextId) -> ManagerResult<Option<TransactionId>> {
        let bindings = self.bindings.read().await;
        Ok(bindings.get(&ctx).copied())
    }

    async fn status(&self, handle: &TransactionId) -> ManagerResult<TransactionStatus> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .get(handle)
            .map(|txn| txn.status())
            .unwrap_or(TransactionStatus::NoTransaction))
    }
}

pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub suspended: bool,
    pub timeout: Option<Duration>,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_binds_context() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        assert_eq!(manager.current(ctx).await.unwrap(), None);
        let txn = manager.begin(ctx, 0).await.unwrap();
        assert_eq!(manager.current(ctx).await.unwrap(), Some(txn));
        assert_eq!(manager.status(&txn).await.unwrap(), TransactionStatus::Active);
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        manager.begin(ctx, 0).await.unwrap();
        let err = manager.begin(ctx, 0).await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn test_bindings_are_per_context() {
        let manager = InMemoryTransactionManager::new();
        let first = ContextId::new();
        let second = ContextId::new();

        let a = manager.begin(first, 0).await.unwrap();
        let b = manager.begin(second, 0).await.unwrap();
        assert_ne!(a, b);

        manager.commit(first).await.unwrap();
        assert_eq!(manager.current(first).await.unwrap(), None);
        assert_eq!(manager.current(second).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_commit_clears_binding() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        manager.commit(ctx).await.unwrap();

        assert_eq!(manager.current(ctx).await.unwrap(), None);
        assert_eq!(manager.status(&txn).await.unwrap(), TransactionStatus::NoTransaction);
        assert!(manager.get_transaction_info(txn).await.is_none());
    }

    #[tokio::test]
    async fn test_ended_transactions_are_released() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let first = manager.begin(ctx, 0).await.unwrap();
        manager.commit(ctx).await.unwrap();
        for _ in 0..100 {
            manager.begin(ctx, 0).await.unwrap();
            manager.rollback(ctx).await.unwrap();
        }

        assert_eq!(manager.live_count().await, 0);
        assert!(manager.get_transaction_info(first).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_releases_transaction() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        manager.set_rollback_only(ctx).await.unwrap();
        assert!(manager.commit(ctx).await.is_err());

        assert_eq!(manager.live_count().await, 0);
        assert!(manager.get_transaction_info(txn).await.is_none());
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let manager = InMemoryTransactionManager::new();
        let err = manager.commit(ContextId::new()).await.unwrap_err();
        assert!(matches!(err, ManagerError::NotBound(_)));
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        let handle = manager.suspend(ctx).await.unwrap();
        assert_eq!(handle, txn);
        assert_eq!(manager.current(ctx).await.unwrap(), None);
        assert!(manager.get_transaction_info(txn).await.unwrap().suspended);

        manager.resume(ctx, handle).await.unwrap();
        assert_eq!(manager.current(ctx).await.unwrap(), Some(txn));
        assert_eq!(manager.status(&txn).await.unwrap(), TransactionStatus::Active);
    }

    #[tokio::test]
    async fn test_resume_while_bound_fails() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        manager.begin(ctx, 0).await.unwrap();
        let handle = manager.suspend(ctx).await.unwrap();
        manager.begin(ctx, 0).await.unwrap();

        let err = manager.resume(ctx, handle).await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn test_resume_of_unsuspended_fails() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let other = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        let err = manager.resume(other, txn).await.unwrap_err();
        assert!(matches!(err, ManagerError::NotSuspended(_)));

        manager.commit(ctx).await.unwrap();
        let err = manager.resume(ctx, txn).await.unwrap_err();
        assert!(matches!(err, ManagerError::UnknownTransaction(_)));
    }

    #[tokio::test]
    async fn test_set_rollback_only() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        manager.set_rollback_only(ctx).await.unwrap();
        assert_eq!(manager.status(&txn).await.unwrap(), TransactionStatus::MarkedRollback);

        assert!(manager.commit(ctx).await.is_err());
        assert_eq!(manager.current(ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let manager = InMemoryTransactionManager::with_config(ManagerConfig::new().default_timeout(30));
        let ctx = ContextId::new();

        let txn = manager.begin(ctx, 0).await.unwrap();
        let info = manager.get_transaction_info(txn).await.unwrap();
        assert_eq!(info.timeout, Some(Duration::from_secs(30)));
        manager.rollback(ctx).await.unwrap();

        let txn = manager.begin(ctx, 5).await.unwrap();
        let info = manager.get_transaction_info(txn).await.unwrap();
        assert_eq!(info.timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_live_count_includes_suspended() {
        let manager = InMemoryTransactionManager::new();
        let ctx = ContextId::new();

        manager.begin(ctx, 0).await.unwrap();
        manager.suspend(ctx).await.unwrap();
        manager.begin(ctx, 0).await.unwrap();
        assert_eq!(manager.live_count().await, 2);

        manager.commit(ctx).await.unwrap();
        assert_eq!(manager.live_count().await, 1);
    }
}
