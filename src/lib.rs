pub mod cli;
pub mod config;
pub mod models;
pub mod query;
pub mod reorder;
pub mod services;
pub mod storage;
pub mod ui;
pub mod weather;
