use std::fmt::{Display, Formatter};
use std::time::Instant;

use crate::torrent::InfoHash;

/// The announce-event tag carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnounceEvent {
    Started,
    None,
    Completed,
    Stopped,
}

impl Display for AnnounceEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            AnnounceEvent::Started => "started",
            AnnounceEvent::None => "",
            AnnounceEvent::Completed => "completed",
            AnnounceEvent::Stopped => "stopped",
        };
        write!(f, "{}", value)
    }
}

/// An immutable value describing a single scheduled announce: which
/// torrent, which event, and when it becomes due.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub event: AnnounceEvent,
    pub ready_at: Instant,
}

impl AnnounceRequest {
    pub fn new(info_hash: InfoHash, event: AnnounceEvent, ready_at: Instant) -> Self {
        Self {
            info_hash,
            event,
            ready_at,
        }
    }
}
