use thiserror::Error;

/// Failure reported by a renderer.
///
/// Errors are `Clone + PartialEq` so fan-out aggregation can hand back the
/// exact error a member produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RendererError {
    #[error("renderer '{renderer}' failed to initialise: {message}")]
    Initialise { renderer: String, message: String },

    #[error("renderer '{renderer}' run loop failed: {message}")]
    Run { renderer: String, message: String },

    #[error("renderer '{renderer}' failed during {operation}: {message}")]
    Operation {
        renderer: String,
        operation: &'static str,
        message: String,
    },

    #[error("renderer '{renderer}' panicked during {operation}")]
    Panicked {
        renderer: String,
        operation: &'static str,
    },

    #[error("renderer '{renderer}' received {operation} before initialise")]
    Uninitialised {
        renderer: String,
        operation: &'static str,
    },
}

impl RendererError {
    #[must_use]
    pub fn initialise(renderer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Initialise {
            renderer: renderer.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn run(renderer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Run {
            renderer: renderer.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn operation(
        renderer: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            renderer: renderer.into(),
            operation,
            message: message.into(),
        }
    }

    /// Name of the renderer that produced this error.
    #[must_use]
    pub fn renderer(&self) -> &str {
        match self {
            Self::Initialise { renderer, .. }
            | Self::Run { renderer, .. }
            | Self::Operation { renderer, .. }
            | Self::Panicked { renderer, .. }
            | Self::Uninitialised { renderer, .. } => renderer,
        }
    }
}

/// Failure to bring a manager loop up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("{component} is already started")]
    AlreadyStarted { component: &'static str },

    #[error("failed to spawn {component} thread: {message}")]
    Spawn {
        component: &'static str,
        message: String,
    },
}
