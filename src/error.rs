//! Error types for the crate.

use thiserror::Error;

/// Main error type for `lot-mcmc`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed datum: {context} (expected a mapping from output strings to counts)")]
    MalformedDatum { context: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while evaluating or building a hypothesis.
///
/// The sampler treats any of these as a zero-probability outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("recursion depth exceeded bound of {bound}")]
    RecursionDepth { bound: usize },

    #[error("program has {nodes} nodes, more than the limit of {max}")]
    TooBig { nodes: usize, max: usize },

    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl Error {
    pub(crate) fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = Error::MalformedDatum {
            context: "output was the single value \"ab\"".to_string(),
        };
        assert!(err.to_string().contains("mapping from output strings to counts"));

        let eval = EvalError::RecursionDepth { bound: 20 };
        assert_eq!(eval.to_string(), "recursion depth exceeded bound of 20");
    }
}
