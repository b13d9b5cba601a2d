//! Snapshot-isolation visibility: a `ReadView` fixes which transactions'
//! writes a reader can see.

use std::collections::HashSet;

use crate::common::TrxId;
use crate::mvcc::row::Row;

/// A snapshot of in-flight transactions at the moment a reader started.
#[derive(Debug, Clone)]
pub struct ReadView {
    active_trx_ids: HashSet<TrxId>,
    min_active: TrxId,
    max_trx: TrxId,
    creator: TrxId,
    created_at: u64,
}

impl ReadView {
    /// Build a view for `creator`, given the set of transactions active at
    /// snapshot time and the next transaction id that will be assigned.
    /// `creator` is excluded from the active set -- a transaction always
    /// sees its own writes regardless of the general visibility rules.
    pub fn create(active: &HashSet<TrxId>, next: TrxId, creator: TrxId, created_at: u64) -> Self {
        let mut active_trx_ids = active.clone();
        active_trx_ids.remove(&creator);
        let min_active = active_trx_ids.iter().min().copied().unwrap_or(next);

        Self { active_trx_ids, min_active, max_trx: next, creator, created_at }
    }

    pub fn creator(&self) -> TrxId {
        self.creator
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Five-rule visibility predicate, ignoring the row's `deleted` flag:
    /// 1. the reader's own writes are always visible
    /// 2. a row written by a transaction that didn't exist yet at snapshot
    ///    time is never visible
    /// 3. a row committed before every transaction active at snapshot time
    ///    started is always visible
    /// 4. a row written by a transaction that was active (uncommitted) at
    ///    snapshot time is never visible
    /// 5. otherwise the row committed in the window and is visible
    pub fn is_visible(&self, row: &Row) -> bool {
        if row.trx_id == self.creator {
            return true;
        }
        if row.trx_id >= self.max_trx {
            return false;
        }
        if row.trx_id < self.min_active {
            return true;
        }
        if self.active_trx_ids.contains(&row.trx_id) {
            return false;
        }
        true
    }

    /// As [`Self::is_visible`], but a row that is visible yet marked
    /// deleted is treated as invisible -- including a transaction's own
    /// deletion of its own row.
    pub fn is_row_visible(&self, row: &Row) -> bool {
        self.is_visible(row) && !row.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::data_type::DataValue;

    fn row(trx_id: TrxId) -> Row {
        Row::new(trx_id, vec![DataValue::Int64(1)])
    }

    #[test]
    fn test_own_writes_always_visible() {
        let view = ReadView::create(&HashSet::new(), 10, 5, 0);
        let mut r = row(5);
        r.deleted = true;
        assert!(view.is_visible(&r));
        // but a deleted own-row is still invisible via is_row_visible
        assert!(!view.is_row_visible(&r));
    }

    #[test]
    fn test_future_transaction_not_visible() {
        let view = ReadView::create(&HashSet::new(), 10, 5, 0);
        assert!(!view.is_visible(&row(10)));
        assert!(!view.is_visible(&row(15)));
    }

    #[test]
    fn test_committed_before_min_active_visible() {
        let active = HashSet::from([7, 8]);
        let view = ReadView::create(&active, 10, 5, 0);
        assert!(view.is_visible(&row(3)));
    }

    #[test]
    fn test_concurrently_active_not_visible() {
        let active = HashSet::from([7, 8]);
        let view = ReadView::create(&active, 10, 5, 0);
        assert!(!view.is_visible(&row(7)));
    }

    #[test]
    fn test_committed_in_window_visible() {
        let active = HashSet::from([7, 9]);
        let view = ReadView::create(&active, 10, 5, 0);
        assert!(view.is_visible(&row(8)));
    }

    #[test]
    fn test_no_active_transactions_falls_back_to_next() {
        let view = ReadView::create(&HashSet::new(), 10, 5, 0);
        assert!(view.is_visible(&row(9)));
        assert!(!view.is_visible(&row(10)));
    }
}
