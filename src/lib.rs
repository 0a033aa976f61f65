pub mod recognition;
pub mod models;
pub mod my_utils;
pub mod config;
pub mod error;
pub mod server;
