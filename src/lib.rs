pub mod assets;
pub mod cli;
pub mod config;
pub mod db;
pub mod migrate;
pub mod storage;
pub mod store;
pub mod types;
pub mod verify;
