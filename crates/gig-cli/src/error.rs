//! CLI error types.

use gig_market::MarketError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The script file could not be parsed.
    #[error("invalid script: {0}")]
    Script(String),

    /// A marketplace action was rejected in strict mode.
    #[error("action {index} rejected: {source}")]
    Rejected {
        /// Position of the action in the script.
        index: usize,
        /// The marketplace error.
        #[source]
        source: MarketError,
    },

    /// Marketplace setup failed.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Output serialization failed.
    #[error("format error: {0}")]
    Format(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gig_core::JobId;

    #[test]
    fn rejected_display_names_index() {
        let err = CliError::Rejected {
            index: 3,
            source: MarketError::JobNotFound(JobId::FIRST),
        };
        assert_eq!(err.to_string(), format!("action 3 rejected: {}", MarketError::JobNotFound(JobId::FIRST)));
    }

    #[test]
    fn market_error_is_transparent() {
        let err = CliError::from(MarketError::InvalidRole);
        assert_eq!(err.to_string(), MarketError::InvalidRole.to_string());
    }
}
