pub mod metrics_routes;
