// Unit tests for configuration
mod config_test;

mod worker_test;
