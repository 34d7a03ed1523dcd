pub mod common;
pub mod metric;
