pub mod metric_snapshot_entity;
pub mod metric_sqlite_adapter;
pub mod metric_sqlite_reader;
pub mod metric_store_naming;
pub mod metric_store_registry;
pub mod metric_write_queue;
