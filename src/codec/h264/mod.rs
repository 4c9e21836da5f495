//! # H.264/AVC bitstream handling
//!
//! - NAL unit parsing, SPS/PPS parsing and writing
//! - Slice header parsing for baseline streams
//! - Reframing between Annex-B start codes and length-prefixed records
//! - `sprop-parameter-sets` rendering for SDP
//!
//! ## Example: Reframing an encoded sample
//!
//! ```rust
//! use avpipe::codec::h264::{length_prefixed_to_annexb, split_annexb, START_CODE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sample = [0, 0, 0, 3, 0x65, 0x88, 0x80];
//! let annexb = length_prefixed_to_annexb(&sample)?;
//! assert_eq!(&annexb[..4], &START_CODE);
//!
//! for nal in split_annexb(&annexb)? {
//!     println!("NAL type {}", nal[0] & 0x1F);
//! }
//! # Ok(())
//! # }
//! ```

/// Annex-B and length-prefixed framing
pub mod annexb;
/// Parameter set writing and the SPS/PPS pair type
pub mod params;
/// Parser for H.264 bitstreams, implementing NAL unit extraction and parsing
pub mod parser;
/// NAL unit, parameter set and slice header types
pub mod types;

#[cfg(test)]
mod parser_test;

#[doc(inline)]
pub use annexb::*;
#[doc(inline)]
pub use params::{ParameterSets, SpsParams};
#[doc(inline)]
pub use parser::H264Parser;
#[doc(inline)]
pub use types::*;
