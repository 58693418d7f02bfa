pub mod catalog;
pub mod config;
pub mod permissions;
pub mod schedule_store;
pub mod storage;
