#![forbid(unsafe_code)]

//! Batch launcher core: sequencing engine, stop coordinator, outcome
//! policy, and the collaborator contracts they drive.

pub mod config;
pub mod display;
pub mod errors;
pub mod launcher;
pub mod models;
pub mod orchestrator;

pub use config::BatchFile;
pub use errors::{AppError, Result};
