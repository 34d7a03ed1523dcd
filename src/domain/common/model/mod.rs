//! Shared domain types

pub mod monitored_app;
