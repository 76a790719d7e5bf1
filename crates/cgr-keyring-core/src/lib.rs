//! Core credential resolution logic for cgr-keyring
//!
//! This crate provides:
//! - The domain predicate deciding which services are handled
//! - An in-process token cache
//! - The credential resolver and its keyring-style backend interface
//! - An environment hook injecting tokens at setup time

mod cache;
mod eligibility;
mod error;
mod hook;
mod keyring;
mod resolver;

pub use cache::*;
pub use eligibility::*;
pub use error::*;
pub use hook::*;
pub use keyring::*;
pub use resolver::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
