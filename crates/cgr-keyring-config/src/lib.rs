//! Configuration parsing for cgr-keyring
//!
//! This crate handles parsing of the global configuration
//! (`~/.config/cgr-keyring/config.toml`).

mod error;
mod global;

pub use error::*;
pub use global::*;
