pub mod metrics_controller;
