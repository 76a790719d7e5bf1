//! CLI command implementations

mod keyring;
mod setup;

pub use keyring::*;
pub use setup::*;
