pub mod exposition;
pub mod fetcher;
pub mod locator;
pub mod source;
pub mod task;
