//! Error types for token issuers

use thiserror::Error;

/// Longest stderr excerpt kept in a [`IssuerError::ToolExecution`]
pub const STDERR_EXCERPT_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum IssuerError {
    #[error("{0} command not found. Please ensure {0} is installed and in PATH")]
    ToolNotFound(String),

    #[error("{tool} exited with {}: {stderr}", exit_label(.exit_code))]
    ToolExecution {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{0} returned an empty token")]
    Issuance(String),

    #[error("Cancelled before the token tool finished")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl IssuerError {
    /// Build a `ToolExecution` error, keeping only a trimmed excerpt of stderr
    pub fn execution(tool: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let excerpt = match stderr.char_indices().nth(STDERR_EXCERPT_LEN) {
            Some((idx, _)) => format!("{}...", &stderr[..idx]),
            None => stderr.to_string(),
        };
        Self::ToolExecution {
            tool: tool.to_string(),
            exit_code,
            stderr: excerpt,
        }
    }
}

pub type Result<T> = std::result::Result<T, IssuerError>;
