//! Error types for the host binary.
//!
//! [`EngineError`] wraps every failure mode of startup and of the room
//! tasks so `main` can propagate with `?`.

/// Top-level error for the host binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: prism_core::config::ConfigError,
    },

    /// The run could not be planned.
    #[error("plan error: {source}")]
    Plan {
        /// The underlying plan error.
        #[from]
        source: prism_core::run_plan::PlanError,
    },

    /// A lobby operation was rejected.
    #[error("lobby error: {source}")]
    Lobby {
        /// The underlying lobby error.
        #[from]
        source: prism_core::lobby::LobbyError,
    },

    /// A room failed outside its tick loop.
    #[error("room error: {source}")]
    Room {
        /// The underlying room error.
        #[from]
        source: prism_core::room::RoomError,
    },

    /// A room tick loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: prism_core::runner::RunnerError,
    },

    /// A room task panicked or was cancelled.
    #[error("room task failed: {message}")]
    Task {
        /// Description of the task failure.
        message: String,
    },

    /// The log subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
