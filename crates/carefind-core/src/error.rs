use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ModelUnavailable,
    StoreUnavailable,
    MalformedRecord,
    InvalidQuery,
    ConfigInvalid,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ModelUnavailable => "E1001",
            Self::StoreUnavailable => "E2001",
            Self::MalformedRecord => "E3001",
            Self::InvalidQuery => "E4001",
            Self::ConfigInvalid => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ModelUnavailable => "Embedding model unavailable",
            Self::StoreUnavailable => "Provider store unavailable",
            Self::MalformedRecord => "Malformed provider record",
            Self::InvalidQuery => "Invalid search query",
            Self::ConfigInvalid => "Invalid configuration",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ModelUnavailable => Some(
                "Check CAREFIND_EMBEDDING_MODEL, network access for the first download, or build with `--features semantic`.",
            ),
            Self::StoreUnavailable => {
                Some("Check the database path and permissions, then run `carefind init`.")
            }
            Self::MalformedRecord => {
                Some("Fix the reported record in the source file and re-run the ingestion.")
            }
            Self::InvalidQuery => None,
            Self::ConfigInvalid => Some("Fix carefind.toml or the CAREFIND_* environment variables."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure the search core can surface to its immediate caller.
///
/// None of these are ever folded into an empty result set: "no matches" and
/// "could not search" must stay distinguishable.
#[derive(Debug, thiserror::Error)]
pub enum CarefindError {
    #[error("embedding model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("provider store unavailable: {context}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("malformed provider record at position {position}{}: {reason}", describe_id(.id))]
    MalformedRecord {
        position: usize,
        id: Option<i64>,
        reason: String,
    },

    #[error("invalid value for '{field}': {message}")]
    InvalidQuery { field: &'static str, message: String },

    #[error("invalid configuration in {origin}: {reason}")]
    Config { origin: String, reason: String },
}

pub type Result<T, E = CarefindError> = std::result::Result<T, E>;

impl CarefindError {
    pub fn model(model: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::StoreUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn invalid_query(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            field,
            message: message.into(),
        }
    }

    pub fn malformed(position: usize, id: Option<i64>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            position,
            id,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::InvalidQuery { .. } => ErrorCode::InvalidQuery,
            Self::Config { .. } => ErrorCode::ConfigInvalid,
        }
    }
}

fn describe_id(id: &Option<i64>) -> String {
    id.map(|id| format!(" (id {id})")).unwrap_or_default()
}

/// Attach store context to fallible `rusqlite` calls, `anyhow::Context` style.
pub trait StoreContext<T> {
    /// Wrap the error as [`CarefindError::StoreUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is `Err`.
    fn store_context(self, context: impl Into<String>) -> Result<T>;

    /// Lazily built variant of [`StoreContext::store_context`].
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is `Err`.
    fn with_store_context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T>;
}

impl<T, E> StoreContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn store_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|err| CarefindError::store(context, err))
    }

    fn with_store_context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|err| CarefindError::store(context(), err))
    }
}
