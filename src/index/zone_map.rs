//! Zone maps: per-page min/max statistics used to skip pages a predicate
//! cannot match without reading them.

use std::cmp::Ordering;

use dashmap::DashMap;

use crate::catalog::data_type::DataValue;
use crate::common::{ColumnId, PageId, TableId};

/// A comparison a caller wants to test a page's zone against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneEntry {
    pub min: DataValue,
    pub max: DataValue,
    pub row_count: u32,
}

type Key = (TableId, PageId, ColumnId);

/// Tracks per-`(table, page, column)` min/max/row-count statistics so scans
/// can skip pages a predicate provably cannot match.
pub struct ZoneMap {
    entries: DashMap<Key, ZoneEntry>,
}

impl ZoneMap {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Whole-entry replace -- stats are always recomputed together, never
    /// patched incrementally.
    pub fn update_page_stats(&self, table: TableId, page: PageId, column: ColumnId, entry: ZoneEntry) {
        self.entries.insert((table, page, column), entry);
    }

    pub fn get(&self, table: TableId, page: PageId, column: ColumnId) -> Option<ZoneEntry> {
        self.entries.get(&(table, page, column)).map(|e| e.clone())
    }

    /// True if `column op value` cannot match any row on `page`, so the
    /// scan can skip reading it. An absent entry, or a page whose zone is
    /// all-null, is never skippable.
    pub fn can_skip_page(&self, table: TableId, page: PageId, column: ColumnId, op: CompareOp, value: &DataValue) -> bool {
        let Some(zone) = self.entries.get(&(table, page, column)) else { return false };
        if zone.min.is_null() && zone.max.is_null() {
            return false;
        }

        let (Some(min_ord), Some(max_ord)) = (compare(&zone.min, value), compare(&zone.max, value)) else {
            return false;
        };

        match op {
            // no row can equal value if value falls entirely outside [min, max]
            CompareOp::Eq => min_ord == Ordering::Greater || max_ord == Ordering::Less,
            // skip "!=" only when every row in the zone is provably equal to value
            CompareOp::Ne => min_ord == Ordering::Equal && max_ord == Ordering::Equal,
            // no row can be < value if min >= value
            CompareOp::Lt => min_ord != Ordering::Less,
            // no row can be <= value if min > value
            CompareOp::Le => min_ord == Ordering::Greater,
            // no row can be > value if max <= value
            CompareOp::Gt => max_ord != Ordering::Greater,
            // no row can be >= value if max < value
            CompareOp::Ge => max_ord == Ordering::Less,
        }
    }
}

impl Default for ZoneMap {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &DataValue, b: &DataValue) -> Option<Ordering> {
    match (a, b) {
        (DataValue::Int32(a), DataValue::Int32(b)) => a.partial_cmp(b),
        (DataValue::Int64(a), DataValue::Int64(b)) => a.partial_cmp(b),
        (DataValue::Float64(a), DataValue::Float64(b)) => a.partial_cmp(b),
        (DataValue::Bool(a), DataValue::Bool(b)) => a.partial_cmp(b),
        (DataValue::VarChar(a), DataValue::VarChar(b)) => a.partial_cmp(b),
        (DataValue::Bytes(a), DataValue::Bytes(b)) => a.partial_cmp(b),
        _ => None,
    }
}
