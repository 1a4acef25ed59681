//! Quest Core - Domain models, settings, URI grammar and plugin contracts
//!
//! This crate contains the domain types shared by every other Quest crate, the
//! `Provider` port that data-source adapters implement, and the I/O handler
//! registry used to read and write dataset files.

pub mod config;
pub mod error;
pub mod formats;
pub mod fs;
pub mod models;
pub mod ports;
pub mod uri;

pub use error::{QuestError, Result};
