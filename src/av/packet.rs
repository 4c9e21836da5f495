use bytes::Bytes;
use std::time::Duration;

use super::MediaType;

/// A compressed unit handed to listeners: one Annex-B video access unit or
/// one AAC access unit.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Payload: Annex-B for video, a raw or ADTS access unit for audio
    pub data: Bytes,
    /// Which stream the packet belongs to
    pub media: MediaType,
    /// Presentation timestamp in microseconds
    pub pts: Option<i64>,
    /// Set on IDR pictures and on every audio packet
    pub is_key: bool,
    /// Time the packet covers
    pub duration: Option<Duration>,
}

impl Packet {
    /// A packet with no timing and the key flag cleared.
    pub fn new(media: MediaType, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            media,
            pts: None,
            is_key: false,
            duration: None,
        }
    }

    /// Sets the presentation time in microseconds.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Marks the packet as decodable on its own.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Sets the time the packet covers.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
