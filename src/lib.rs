pub mod background;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod models;
pub mod utils;
