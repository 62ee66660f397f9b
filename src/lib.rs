// Library exports for the binary and integration tests
pub mod config;
pub mod error;
pub mod i18n;
pub mod index;
pub mod limiter;
pub mod provider;
pub mod reset;
pub mod retry;
pub mod security;
pub mod server;
pub mod store;
pub mod translation;
