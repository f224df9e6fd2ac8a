pub mod config;
pub mod config_validation;
pub mod dashboard;
pub mod display;
pub mod load_models;
pub mod metrics;
pub mod mock;
pub mod percentiles;
pub mod results;
pub mod runner;
pub mod script;
pub mod server;
pub mod test_config;
pub mod utils;
