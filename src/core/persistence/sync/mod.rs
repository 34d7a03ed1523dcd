pub mod app_sync_repository;
