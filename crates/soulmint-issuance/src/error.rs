use soulmint_core::AuthorizationDenial;
use thiserror::Error;

/// Every way an issuance action can end without a confirmed write.
///
/// Gate and validation variants are raised before anything is submitted.
/// `SubmissionFailed` and `ConfirmationFailed` carry the write
/// collaborator's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuanceError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("wrong network: {0}")]
    WrongNetwork(String),

    #[error("not authorized: connected wallet is not the contract owner")]
    NotAuthorized,

    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("no valid identifiers")]
    EmptyRecipientSet,

    #[error("invalid token id (must be > 0): {0}")]
    InvalidTokenId(String),

    #[error("{0}")]
    SubmissionFailed(String),

    #[error("{0}")]
    ConfirmationFailed(String),
}

impl IssuanceError {
    /// Stable kebab-case code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            IssuanceError::NotConnected => "not-connected",
            IssuanceError::WrongNetwork(_) => "wrong-network",
            IssuanceError::NotAuthorized => "not-authorized",
            IssuanceError::MalformedIdentifier(_) => "malformed-identifier",
            IssuanceError::EmptyRecipientSet => "empty-recipient-set",
            IssuanceError::InvalidTokenId(_) => "invalid-token-id",
            IssuanceError::SubmissionFailed(_) => "submission-failed",
            IssuanceError::ConfirmationFailed(_) => "confirmation-failed",
        }
    }
}

impl From<AuthorizationDenial> for IssuanceError {
    fn from(denial: AuthorizationDenial) -> Self {
        match denial {
            AuthorizationDenial::NotConnected => IssuanceError::NotConnected,
            AuthorizationDenial::WrongNetwork { .. } => {
                IssuanceError::WrongNetwork(denial.to_string())
            }
            AuthorizationDenial::NotAuthorized => IssuanceError::NotAuthorized,
        }
    }
}

pub type IssuanceResult<T> = Result<T, IssuanceError>;
