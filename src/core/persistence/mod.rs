pub mod metrics;
pub mod sync;
