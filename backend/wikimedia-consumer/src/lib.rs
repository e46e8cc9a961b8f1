pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod store;
