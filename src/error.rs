use thiserror::Error;
use ui_renderer::{RendererError, StartError};

use crate::binding::BindingError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("renderer initialisation failed: {0}")]
    Initialise(RendererError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("background renderer failed: {0}")]
    BackgroundRenderer(RendererError),

    #[error("primary renderer failed: {0}")]
    PrimaryRenderer(RendererError),

    #[error("application has already run")]
    AlreadyRun,
}

impl AppError {
    /// The renderer at fault, when the failure came from one.
    #[must_use]
    pub fn renderer_error(&self) -> Option<&RendererError> {
        match self {
            Self::Initialise(error) | Self::BackgroundRenderer(error) | Self::PrimaryRenderer(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use ui_renderer::{RendererError, StartError};

    use super::AppError;

    #[test]
    fn error_chains_print_each_cause_once() {
        let error = AppError::BackgroundRenderer(RendererError::run("bridge", "socket closed"));
        assert_eq!(
            error.to_string(),
            "background renderer failed: renderer 'bridge' run loop failed: socket closed"
        );
        assert!(error.source().is_none());
        assert_eq!(error.renderer_error().map(RendererError::renderer), Some("bridge"));

        let error = AppError::from(StartError::AlreadyStarted {
            component: "event hub",
        });
        assert_eq!(error.to_string(), "event hub is already started");
        assert!(error.source().is_none());
    }
}
