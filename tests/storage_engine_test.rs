//! End-to-end `StorageEngine` scenarios: database/table lifecycle, row CRUD,
//! predicate scans, optimize, and persistence across a process restart.

use interchangedb::catalog::{ColumnDef, DataType, DataValue, TableSchema};
use interchangedb::engine::{ScanPredicate, StorageEngine};
use interchangedb::index::CompareOp;
use interchangedb::mvcc::row::Row;
use tempfile::tempdir;

fn orders_schema(id: u32) -> TableSchema {
    let mut pk = ColumnDef::new("id", DataType::Int64, 0);
    pk.is_pk = true;
    pk.nullable = false;
    let columns = vec![pk, ColumnDef::new("customer", DataType::VarChar, 1), ColumnDef::new("total_cents", DataType::Int64, 2)];
    TableSchema::new(id, "shop", "orders", columns, 0).unwrap()
}

#[test]
fn test_full_lifecycle_create_insert_scan_update_delete() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(dir.path(), 32).unwrap();
    engine.create_database("shop", "shop").unwrap();
    engine.create_table("shop", orders_schema(1)).unwrap();

    let mut row_ids = Vec::new();
    for i in 0..10 {
        let row = Row::new(1, vec![DataValue::Int64(i), DataValue::VarChar(format!("cust-{i}")), DataValue::Int64(i * 1000)]);
        row_ids.push(engine.insert_row("shop", "orders", &row).unwrap());
    }

    let all_rows = engine.scan_table("shop", "orders", None).unwrap();
    assert_eq!(all_rows.len(), 10);

    let predicate = ScanPredicate { column: 2, op: CompareOp::Ge, value: DataValue::Int64(7000) };
    let big_orders = engine.scan_table("shop", "orders", Some(&predicate)).unwrap();
    assert_eq!(big_orders.len(), 3); // totals 7000, 8000, 9000

    let updated = Row::new(1, vec![DataValue::Int64(0), DataValue::VarChar("cust-0-renamed".into()), DataValue::Int64(0)]);
    engine.update_row("shop", "orders", row_ids[0], &updated).unwrap();
    let fetched = engine.get_row("shop", "orders", row_ids[0]).unwrap().unwrap();
    assert_eq!(fetched.values[1], DataValue::VarChar("cust-0-renamed".into()));

    engine.delete_row("shop", "orders", row_ids[1]).unwrap();
    let remaining = engine.scan_table("shop", "orders", None).unwrap();
    assert_eq!(remaining.len(), 9);
}

#[test]
fn test_optimize_reclaims_space_after_deletes() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(dir.path(), 32).unwrap();
    engine.create_database("shop", "shop").unwrap();
    engine.create_table("shop", orders_schema(1)).unwrap();

    let mut row_ids = Vec::new();
    for i in 0..20 {
        let row = Row::new(1, vec![DataValue::Int64(i), DataValue::VarChar("x".repeat(200)), DataValue::Int64(i)]);
        row_ids.push(engine.insert_row("shop", "orders", &row).unwrap());
    }
    for &row_id in row_ids.iter().step_by(2) {
        engine.delete_row("shop", "orders", row_id).unwrap();
    }

    let stats = engine.optimize_table("shop", "orders").unwrap();
    assert_eq!(stats.rows, 10);

    let remaining = engine.scan_table("shop", "orders", None).unwrap();
    assert_eq!(remaining.len(), 10);
}

#[test]
fn test_catalog_and_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let row_id;
    {
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        engine.create_database("shop", "shop").unwrap();
        engine.create_table("shop", orders_schema(1)).unwrap();
        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::VarChar("alice".into()), DataValue::Int64(500)]);
        row_id = engine.insert_row("shop", "orders", &row).unwrap();
        engine.buffer_pool().flush_all_pages().unwrap();
    }

    {
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        let fetched = engine.get_row("shop", "orders", row_id).unwrap().unwrap();
        assert_eq!(fetched.values[1], DataValue::VarChar("alice".into()));
    }
}

#[test]
fn test_drop_database_refuses_with_open_table() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(dir.path(), 16).unwrap();
    engine.create_database("shop", "shop").unwrap();
    engine.create_table("shop", orders_schema(1)).unwrap();

    let row = Row::new(1, vec![DataValue::Int64(1), DataValue::VarChar("a".into()), DataValue::Int64(1)]);
    engine.insert_row("shop", "orders", &row).unwrap();

    assert!(engine.drop_database("shop").is_err());
}
