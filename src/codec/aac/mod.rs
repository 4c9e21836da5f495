//! # AAC stream parameters and ADTS framing
//!
//! The encoder emits raw access units; ADTS headers are optional framing for
//! transports that need self-describing packets.

/// ADTS header parsing and frame splitting
pub mod parser;
/// Profile, config and header types
pub mod types;

pub use parser::{AACParser, AdtsFrame};
pub use types::*;
