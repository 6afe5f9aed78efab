//! Event Classifier
//!
//! Decodes raw contract logs into typed present events. Dispatch is on topic0
//! (the event signature hash):
//!
//! | Signature | Event |
//! |---|---|
//! | `WrapPresent(bytes32,address)` | [`PresentEvent::Wrapped`] |
//! | `UnwrapPresent(bytes32,address)` | [`PresentEvent::Unwrapped`] |
//! | `TakeBack(bytes32,address)` | [`PresentEvent::TakenBack`] |
//!
//! topic1 carries the present id and topic2 the actor address, left-padded to
//! 32 bytes. Logs with other signatures are skipped silently; logs with a
//! recognised signature but missing or malformed topics are skipped with a
//! warning.

use std::sync::OnceLock;
use thiserror::Error;

use crate::chain::quantity::{address_from_topic, is_word, signature_hash};
use crate::chain::RawLog;
use crate::store::PresentId;

pub const WRAP_PRESENT_SIGNATURE: &str = "WrapPresent(bytes32,address)";
pub const UNWRAP_PRESENT_SIGNATURE: &str = "UnwrapPresent(bytes32,address)";
pub const TAKE_BACK_SIGNATURE: &str = "TakeBack(bytes32,address)";

/// Discriminant of a present event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Wrapped,
    Unwrapped,
    TakenBack,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[EventKind::Wrapped, EventKind::Unwrapped, EventKind::TakenBack]
    }

    /// Solidity signature of the event
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Wrapped => WRAP_PRESENT_SIGNATURE,
            EventKind::Unwrapped => UNWRAP_PRESENT_SIGNATURE,
            EventKind::TakenBack => TAKE_BACK_SIGNATURE,
        }
    }

    /// topic0 of the event
    pub fn topic(&self) -> &'static str {
        let topics = signature_topics();
        match self {
            EventKind::Wrapped => &topics[0],
            EventKind::Unwrapped => &topics[1],
            EventKind::TakenBack => &topics[2],
        }
    }

    fn from_topic(topic0: &str) -> Option<Self> {
        EventKind::all()
            .iter()
            .copied()
            .find(|kind| kind.topic().eq_ignore_ascii_case(topic0))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Wrapped => write!(f, "wrap"),
            EventKind::Unwrapped => write!(f, "unwrap"),
            EventKind::TakenBack => write!(f, "takeBack"),
        }
    }
}

fn signature_topics() -> &'static [String; 3] {
    static TOPICS: OnceLock<[String; 3]> = OnceLock::new();
    TOPICS.get_or_init(|| {
        [
            signature_hash(EventKind::Wrapped.signature()),
            signature_hash(EventKind::Unwrapped.signature()),
            signature_hash(EventKind::TakenBack.signature()),
        ]
    })
}

/// A decoded present event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentEvent {
    Wrapped { present_id: PresentId, sender: String },
    Unwrapped { present_id: PresentId, taker: String },
    TakenBack { present_id: PresentId, sender: String },
}

impl PresentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PresentEvent::Wrapped { .. } => EventKind::Wrapped,
            PresentEvent::Unwrapped { .. } => EventKind::Unwrapped,
            PresentEvent::TakenBack { .. } => EventKind::TakenBack,
        }
    }

    pub fn present_id(&self) -> &PresentId {
        match self {
            PresentEvent::Wrapped { present_id, .. }
            | PresentEvent::Unwrapped { present_id, .. }
            | PresentEvent::TakenBack { present_id, .. } => present_id,
        }
    }

    /// Address that emitted the action (sender or taker)
    pub fn actor(&self) -> &str {
        match self {
            PresentEvent::Wrapped { sender, .. } | PresentEvent::TakenBack { sender, .. } => sender,
            PresentEvent::Unwrapped { taker, .. } => taker,
        }
    }
}

/// Position of a log in the chain, the total order events are folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

/// A present event together with where it was emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub event: PresentEvent,
    pub position: LogPosition,
    pub transaction_hash: Option<String>,
}

impl ChainEvent {
    pub fn block_number(&self) -> u64 {
        self.position.block_number
    }
}

/// A log whose signature matched but whose topics could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("{kind} log at block {block} is missing topic {index}")]
    MissingTopic {
        kind: EventKind,
        block: u64,
        index: usize,
    },

    #[error("{kind} log at block {block} has malformed topic {index}: {topic}")]
    InvalidTopic {
        kind: EventKind,
        block: u64,
        index: usize,
        topic: String,
    },
}

fn word_topic(log: &RawLog, kind: EventKind, index: usize) -> Result<&str, ClassifyError> {
    let raw = log.topics.get(index).ok_or(ClassifyError::MissingTopic {
        kind,
        block: log.block_number,
        index,
    })?;
    if !is_word(raw) {
        return Err(ClassifyError::InvalidTopic {
            kind,
            block: log.block_number,
            index,
            topic: raw.clone(),
        });
    }
    Ok(raw.as_str())
}

/// Decode a log, distinguishing unrecognised logs (`Ok(None)`) from malformed
/// ones (`Err`)
pub fn try_classify(log: &RawLog) -> Result<Option<ChainEvent>, ClassifyError> {
    let Some(kind) = log.topics.first().and_then(|t| EventKind::from_topic(t)) else {
        return Ok(None);
    };

    let present_id = PresentId::new(word_topic(log, kind, 1)?);
    let actor_topic = word_topic(log, kind, 2)?;
    let actor = address_from_topic(actor_topic).ok_or_else(|| ClassifyError::InvalidTopic {
        kind,
        block: log.block_number,
        index: 2,
        topic: actor_topic.to_string(),
    })?;

    let event = match kind {
        EventKind::Wrapped => PresentEvent::Wrapped {
            present_id,
            sender: actor,
        },
        EventKind::Unwrapped => PresentEvent::Unwrapped {
            present_id,
            taker: actor,
        },
        EventKind::TakenBack => PresentEvent::TakenBack {
            present_id,
            sender: actor,
        },
    };

    Ok(Some(ChainEvent {
        event,
        position: LogPosition {
            block_number: log.block_number,
            log_index: log.log_index,
        },
        transaction_hash: log.transaction_hash.clone(),
    }))
}

/// Decode a log into a present event, skipping anything unrecognised
pub fn classify(log: &RawLog) -> Option<ChainEvent> {
    match try_classify(log) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                error = %e,
                tx = log.transaction_hash.as_deref().unwrap_or("-"),
                "Skipping malformed present log"
            );
            None
        }
    }
}

/// Classify a batch of logs, dropping unrecognised and malformed ones
pub fn classify_all(logs: &[RawLog]) -> Vec<ChainEvent> {
    logs.iter().filter_map(classify).collect()
}
