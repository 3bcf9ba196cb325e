use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Timestamp — wall-clock instant attached to log entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        chrono::Utc::now().into()
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    /// ISO-8601 with millisecond precision and a `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_else(|| "invalid".to_string())
    }

    pub fn unix_millis(&self) -> u64 {
        self.seconds_since_epoch * 1000 + u64::from(self.nanoseconds / 1_000_000)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp() as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}

// ---------------------------------------------------------------------------
// Identifier — 20-byte account address, `0x` + 40 hex digits
//
// Equality is exact (casing included). Use `key()` / `same_account()` for
// the case-insensitive comparison that deduplication and owner checks need.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Parse an identifier, keeping its casing. Mixed-case input must carry
    /// a valid EIP-55 checksum; all-lowercase input is accepted as is.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        if Self::is_well_formed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::MalformedIdentifier(raw.to_string()))
        }
    }

    pub fn is_well_formed(raw: &str) -> bool {
        let Some(body) = raw.strip_prefix("0x") else {
            return false;
        };
        if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        if !body.bytes().any(|b| b.is_ascii_uppercase()) {
            return true;
        }
        checksum_encode(&body.to_ascii_lowercase()) == raw
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form, the deduplication key.
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn same_account(&self, other: &Identifier) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// EIP-55 checksummed form of this identifier.
    pub fn to_checksummed(&self) -> String {
        checksum_encode(&self.0[2..].to_ascii_lowercase())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// A letter at position i is uppercased iff nibble i of
/// keccak256(lowercase hex) is >= 8.
fn checksum_encode(lower_hex: &str) -> String {
    let hash = Keccak256::digest(lower_hex.as_bytes());
    let mut out = String::with_capacity(2 + lower_hex.len());
    out.push_str("0x");
    for (i, c) in lower_hex.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// TokenId — positive credential token identifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(u128);

impl TokenId {
    /// Parse decimal text. Empty text reads as zero, so it is rejected with
    /// the other non-positive values.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidTokenId(raw.to_string()));
        }
        let value: u128 = digits
            .parse()
            .map_err(|_| CoreError::InvalidTokenId(raw.to_string()))?;
        Self::new(value).ok_or_else(|| CoreError::InvalidTokenId(raw.to_string()))
    }

    pub fn new(value: u128) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NetworkId — EVM chain id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub const SEPOLIA: NetworkId = NetworkId(11_155_111);
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TxHandle / SubmissionId
// ---------------------------------------------------------------------------

/// Transaction hash as reported by the write collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub String);

impl TxHandle {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key correlating a submission with its later settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LogEntry — immutable record of one attempted action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Pending,
    Success,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "pending",
            LogStatus::Success => "success",
            LogStatus::Error => "error",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: Timestamp,
    pub action: String,
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<TxHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LogEntry {
    pub fn new(action: impl Into<String>, status: LogStatus) -> Self {
        Self {
            at: Timestamp::now(),
            action: action.into(),
            status,
            hash: None,
            note: None,
        }
    }

    pub fn pending(action: impl Into<String>) -> Self {
        Self::new(action, LogStatus::Pending)
    }

    pub fn success(action: impl Into<String>) -> Self {
        Self::new(action, LogStatus::Success)
    }

    pub fn error(action: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(action, LogStatus::Error).with_note(note)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_hash(mut self, hash: TxHandle) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn at(mut self, at: Timestamp) -> Self {
        self.at = at;
        self
    }
}

// ---------------------------------------------------------------------------
// AuthorizationContext — recomputed before every write, never cached
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDenial {
    NotConnected,
    WrongNetwork {
        expected: NetworkId,
        actual: Option<NetworkId>,
    },
    NotAuthorized,
}

impl fmt::Display for AuthorizationDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationDenial::NotConnected => write!(f, "wallet not connected"),
            AuthorizationDenial::WrongNetwork { expected, actual } => match actual {
                Some(a) => write!(f, "wrong network: connected to {}, expected {}", a, expected),
                None => write!(f, "wrong network: expected {}", expected),
            },
            AuthorizationDenial::NotAuthorized => {
                write!(f, "not authorized: connected wallet is not the contract owner")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub connected: Option<Identifier>,
    pub network: Option<NetworkId>,
    pub owner: Option<Identifier>,
}

impl AuthorizationContext {
    /// Checks run in order: connection, network, ownership. An owner that
    /// has not loaded yet denies.
    pub fn authorize(&self, required: NetworkId) -> Result<&Identifier, AuthorizationDenial> {
        let connected = self
            .connected
            .as_ref()
            .ok_or(AuthorizationDenial::NotConnected)?;
        if self.network != Some(required) {
            return Err(AuthorizationDenial::WrongNetwork {
                expected: required,
                actual: self.network,
            });
        }
        match &self.owner {
            Some(owner) if owner.same_account(connected) => Ok(connected),
            _ => Err(AuthorizationDenial::NotAuthorized),
        }
    }

    pub fn is_authorized(&self, required: NetworkId) -> bool {
        self.authorize(required).is_ok()
    }
}

// ---------------------------------------------------------------------------
// WriteCall / Settlement — the contract-write collaborator's vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", content = "args")]
pub enum WriteCall {
    #[serde(rename = "mint")]
    Mint { student: Identifier },
    #[serde(rename = "mintBatch")]
    MintBatch { students: Vec<Identifier> },
    #[serde(rename = "revoke")]
    Revoke { token_id: TokenId },
}

impl WriteCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            WriteCall::Mint { .. } => "mint",
            WriteCall::MintBatch { .. } => "mintBatch",
            WriteCall::Revoke { .. } => "revoke",
        }
    }

    /// Number of credentials this call issues.
    pub fn issued_count(&self) -> usize {
        match self {
            WriteCall::Mint { .. } => 1,
            WriteCall::MintBatch { students } => students.len(),
            WriteCall::Revoke { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Confirmed { tx: TxHandle },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub submission: SubmissionId,
    pub outcome: SettlementOutcome,
}
