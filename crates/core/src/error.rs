//! Error taxonomy for the nowcast core
//!
//! Every fallible stage returns [`NowcastError`]. Configuration problems are
//! reported before any field is touched; numerical problems carry the stage
//! (and member, when the failure happened inside a member trajectory) so the
//! orchestrator can apply its failure policy without inspecting strings.

/// Errors produced by the nowcast pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum NowcastError {
    /// Invalid parameter or parameter combination (never retried)
    Configuration(String),
    /// Non-finite or degenerate values produced by a numerical stage
    Numerical {
        /// Pipeline stage that produced the values (e.g. `"decomposition"`)
        stage: &'static str,
        /// Ensemble member, if the failure is member-local
        member: Option<usize>,
        /// Human-readable description
        detail: String,
    },
    /// An optional backend was requested but is not compiled in
    DependencyUnavailable {
        /// Backend name
        backend: &'static str,
        /// Why it cannot be used
        reason: String,
    },
    /// The run was cancelled through its cancellation token
    Cancelled,
}

impl NowcastError {
    /// Build a configuration error from anything printable.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Build a numerical error that is not (yet) attributed to a member.
    pub fn numerical(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::Numerical {
            stage,
            member: None,
            detail: detail.into(),
        }
    }

    /// Attribute a numerical error to an ensemble member.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn for_member(self, index: usize) -> Self {
        match self {
            Self::Numerical { stage, detail, .. } => Self::Numerical {
                stage,
                member: Some(index),
                detail,
            },
            other => other,
        }
    }

    /// Whether this error is member-local and may be tolerated by the
    /// `drop` failure policy.
    pub fn is_member_local(&self) -> bool {
        matches!(
            self,
            Self::Numerical {
                member: Some(_),
                ..
            }
        )
    }
}

impl std::fmt::Display for NowcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NowcastError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            NowcastError::Numerical {
                stage,
                member: Some(member),
                detail,
            } => write!(f, "Numerical error in {stage} (member {member}): {detail}"),
            NowcastError::Numerical {
                stage,
                member: None,
                detail,
            } => write!(f, "Numerical error in {stage}: {detail}"),
            NowcastError::DependencyUnavailable { backend, reason } => {
                write!(f, "Backend '{backend}' unavailable: {reason}")
            }
            NowcastError::Cancelled => write!(f, "Nowcast cancelled"),
        }
    }
}

impl std::error::Error for NowcastError {}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, NowcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_attribution_only_touches_numerical() {
        let err = NowcastError::numerical("ar", "nan").for_member(3);
        assert!(err.is_member_local());
        assert_eq!(
            err.to_string(),
            "Numerical error in ar (member 3): nan"
        );

        let cfg = NowcastError::config("bad").for_member(3);
        assert_eq!(cfg, NowcastError::Configuration("bad".to_string()));
        assert!(!cfg.is_member_local());
    }

    #[test]
    fn test_display_messages() {
        let err = NowcastError::DependencyUnavailable {
            backend: "parallel",
            reason: "feature disabled".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Backend 'parallel' unavailable: feature disabled"
        );
        assert_eq!(NowcastError::Cancelled.to_string(), "Nowcast cancelled");
    }
}
