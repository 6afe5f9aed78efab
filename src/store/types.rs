//! Core data types for reconstructed presents
//!
//! This module defines the entity model the indexer folds events into:
//! - `PresentId`: 32-byte present identifier (opaque hex)
//! - `Present`: the current reconstructed state of one gift
//! - `PresentStatus`: the status state machine
//! - `Asset`: one token transfer carried by a present
//! - `PresentDetails`: a snapshot read of on-chain details used for enrichment

use primitive_types::U256;

use crate::events::EventKind;

/// Identifier of a present, normalised to lowercase `0x`-prefixed hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresentId(String);

impl PresentId {
    /// Create an id from any hex representation (case-insensitive)
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        let body = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        Self(format!("0x{}", body.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PresentId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl std::fmt::Display for PresentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a present
///
/// `Active` moves to `Unwrapped` or `TakenBack` and stays there. `Expired` is
/// never stored; it is projected at read time from the expiry timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentStatus {
    Active,
    Unwrapped,
    Expired,
    TakenBack,
}

impl PresentStatus {
    /// Numeric code used by the contract and the HTTP surface
    pub fn code(&self) -> u8 {
        match self {
            PresentStatus::Active => 0,
            PresentStatus::Unwrapped => 1,
            PresentStatus::Expired => 2,
            PresentStatus::TakenBack => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PresentStatus::Active),
            1 => Some(PresentStatus::Unwrapped),
            2 => Some(PresentStatus::Expired),
            3 => Some(PresentStatus::TakenBack),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PresentStatus::Unwrapped | PresentStatus::TakenBack)
    }
}

impl std::fmt::Display for PresentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresentStatus::Active => write!(f, "active"),
            PresentStatus::Unwrapped => write!(f, "unwrapped"),
            PresentStatus::Expired => write!(f, "expired"),
            PresentStatus::TakenBack => write!(f, "taken_back"),
        }
    }
}

/// Kind of token carried by an asset
pub const TOKEN_TYPE_NATIVE: u8 = 0;
pub const TOKEN_TYPE_ERC20: u8 = 1;

/// Zero address, used by the contract for the native token
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// One token transfer wrapped into a present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Token contract address (zero address for the native token)
    pub token: String,
    /// Raw integer amount in the token's smallest unit
    pub amount: U256,
    /// Token type tag (0 native, 1 ERC-20)
    pub token_type: u8,
}

impl Asset {
    /// Build an asset, deriving the token type from the token address
    pub fn new(token: impl Into<String>, amount: U256) -> Self {
        let token = token.into().to_ascii_lowercase();
        let token_type = if token == ZERO_ADDRESS {
            TOKEN_TYPE_NATIVE
        } else {
            TOKEN_TYPE_ERC20
        };
        Self {
            token,
            amount,
            token_type,
        }
    }
}

/// Where the last applied event for a present came from
///
/// Display and debugging only; never consulted for state decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub event: EventKind,
    pub block_number: u64,
    pub transaction_hash: Option<String>,
}

/// Snapshot of a present as read from the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentDetails {
    pub sender: String,
    pub recipients: Vec<String>,
    pub assets: Vec<Asset>,
    pub message: String,
    pub metadata: String,
    /// Contract-reported status code, informational only
    pub status: u8,
    pub expiry_time: u64,
}

/// Reconstructed state of one present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Present {
    pub id: PresentId,
    pub sender: String,
    /// Empty means public: any address may unwrap
    pub recipients: Vec<String>,
    pub assets: Vec<Asset>,
    pub message: String,
    pub metadata: String,
    pub status: PresentStatus,
    /// Unix seconds; `None` until a snapshot read supplies it
    pub expiry_time: Option<u64>,
    /// Unix seconds of first observation
    pub created_at: i64,
    /// Unix seconds of the last transition or enrichment
    pub updated_at: i64,
    /// Whether a snapshot read has filled in the on-chain details
    pub enriched: bool,
    pub provenance: Option<Provenance>,
}

impl Present {
    /// Create a present from the fields carried by its `Wrapped` event
    pub fn from_event(id: PresentId, sender: impl Into<String>, observed_at: i64) -> Self {
        Self {
            id,
            sender: sender.into(),
            recipients: Vec::new(),
            assets: Vec::new(),
            message: String::new(),
            metadata: String::new(),
            status: PresentStatus::Active,
            expiry_time: None,
            created_at: observed_at,
            updated_at: observed_at,
            enriched: false,
            provenance: None,
        }
    }

    /// Merge a snapshot read into this present
    ///
    /// Only descriptive fields are taken from the snapshot. Sender and status
    /// stay event-sourced.
    pub fn enrich(&mut self, details: PresentDetails, now: i64) {
        self.recipients = details.recipients;
        self.assets = details.assets;
        self.message = details.message;
        self.metadata = details.metadata;
        self.expiry_time = (details.expiry_time > 0).then_some(details.expiry_time);
        self.enriched = true;
        self.updated_at = now;
    }

    /// Status as seen by readers at `now` (unix seconds)
    pub fn effective_status(&self, now: u64) -> PresentStatus {
        match (self.status, self.expiry_time) {
            (PresentStatus::Active, Some(expiry)) if now > expiry => PresentStatus::Expired,
            (status, _) => status,
        }
    }

    /// Whether any address may act as recipient
    pub fn is_public(&self) -> bool {
        self.recipients.is_empty()
    }
}
