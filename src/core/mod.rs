pub mod client;
pub mod persistence;
pub mod state;
