//! Routing engine error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineState;

/// Errors returned by the routing engine's lifecycle operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
