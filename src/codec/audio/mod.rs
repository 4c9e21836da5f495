//! # AAC audio encode and decode
//!
//! Both directions run on their own worker thread. The encoder regroups
//! PCM into 1024-frame access units and can optionally add ADTS headers;
//! the decoder accepts either framing.

mod decoder;
mod encoder;

pub use decoder::AudioDecoder;
pub use encoder::AudioEncoder;
