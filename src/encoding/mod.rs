//! # Byte-Level Encodings
//!
//! Helpers shared by the record codec and the index layer:
//!
//! - [`varint`]: variable-length integers used as length prefixes in the
//!   record body format
//! - [`key`]: type-group-prefixed, byte-comparable keys used by secondary
//!   indexes
//!
//! The canonical per-tag value encodings live with [`crate::value`]; this
//! module only covers the framing around them.

pub mod key;
pub mod varint;
