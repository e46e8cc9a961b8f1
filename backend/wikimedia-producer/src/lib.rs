pub mod bridge;
pub mod config;
pub mod error;
pub mod publisher;
pub mod sse;
pub mod topics;
