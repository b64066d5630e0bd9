use thiserror::Error;

/// A request the rules refused. Recoverable and shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("you cannot vote on your own story part")]
    SelfVote,

    #[error("vote type must be POSITIVE or NEGATIVE")]
    InvalidType,

    #[error("you have already voted on this story part")]
    Duplicate,

    #[error("you cannot add another story part until someone else contributes")]
    NotYourTurn,

    #[error("you must create a character first")]
    NoCharacter,

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("not allowed")]
    Forbidden,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl Rejection {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::SelfVote => "SELF_VOTE",
            Self::InvalidType => "INVALID_TYPE",
            Self::Duplicate => "DUPLICATE",
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::NoCharacter => "NO_CHARACTER",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

/// Result of a rule-checked write: either a typed rejection or an
/// infrastructure failure that rolled the transaction back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl StoreError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Internal(_) => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// True when `e` is a UNIQUE / constraint violation raised by SQLite.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
