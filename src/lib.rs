//! Scheduling engine for recurring channel purge tasks.

pub mod constants;
pub mod database;
pub mod models;
pub mod schedule;
pub mod utils;
