//! # Utility Functions and Types
//!
//! - Bit-level reading and writing for H.264 parameter sets and slice headers
//!
//! ```rust
//! use avpipe::utils::{BitReader, BitWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = BitWriter::new();
//! writer.write_golomb(5);
//! writer.write_trailing_bits();
//!
//! let data = writer.into_bytes();
//! let mut reader = BitReader::new(&data);
//! assert_eq!(reader.read_golomb()?, 5);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

pub use bits::*;
