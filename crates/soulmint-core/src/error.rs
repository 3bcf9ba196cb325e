use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("invalid token id: {0}")]
    InvalidTokenId(String),

    #[error("chain read error: {0}")]
    ChainRead(String),

    #[error("chain write error: {0}")]
    ChainWrite(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::ChainWrite("nonce too low".into());
        assert_eq!(err.to_string(), "chain write error: nonce too low");
    }
}
