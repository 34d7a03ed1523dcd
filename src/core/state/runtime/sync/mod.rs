pub mod sync_state;
pub mod sync_supervisor;
