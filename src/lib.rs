pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod generate;
pub mod sheets;
pub mod state;
