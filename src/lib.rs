//! RIVUS: Wheel of Life self-assessment, AI-generated SMART tasks and
//! weekly reviews, persisted to a hosted service or local storage.

pub mod chart;
pub mod commands;
pub mod db;
pub mod error;
pub mod gateway;
pub mod intelligence;
mod migrations;
pub mod persist;
pub mod state;
pub mod storage;
pub mod types;
pub mod workflow;

pub use error::AppError;
pub use state::AppState;
