//! # Recipe Common Library
//!
//! Shared code for the recipe extraction services:
//! - Error types
//! - Root folder resolution and TOML configuration loading
//! - Extraction job events and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
