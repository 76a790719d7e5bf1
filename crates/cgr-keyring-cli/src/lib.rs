//! cgr-keyring CLI library (exposes command implementations for testing)

pub mod commands;
