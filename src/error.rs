use thiserror::Error;

pub type Result<T> = std::result::Result<T, ElastomerError>;

#[derive(Error, Debug)]
pub enum ElastomerError {
    #[error("Input error: {0}")]
    Input(String),

    /// An inconsistent parameter combination, detected before the solver runs.
    #[error("Configuration error: invalid parameter '{parameter}': {message}")]
    Configuration { parameter: String, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Mesher error: {0}")]
    Mesher(String),

    #[error("Solver error: {0}")]
    Solver(String),

    /// The nonlinear solve did not reach the requested tolerance.
    #[error("Convergence error: {0}")]
    Convergence(String),

    /// A single artifact could not be embedded. Never fatal to a run.
    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ElastomerError {
    pub fn configuration(parameter: &str, message: impl Into<String>) -> ElastomerError {
        ElastomerError::Configuration {
            parameter: parameter.to_owned(),
            message: message.into(),
        }
    }

    /// Whether the error aborts the current pipeline run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ElastomerError::Render(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_names_parameter() {
        let err = ElastomerError::configuration("d", "must be smaller than D");
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid parameter 'd': must be smaller than D"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn render_errors_are_not_fatal() {
        assert!(!ElastomerError::Render("no display".to_owned()).is_fatal());
        assert!(ElastomerError::Convergence("diverged".to_owned()).is_fatal());
    }
}
