#![crate_type = "lib"]
#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! Framing layer adapting the tagpack codec to chunked byte streams.
//!
//! The codec itself is frame-oriented: one `encode` call produces one
//! self-contained byte frame. This crate supplies the plumbing around
//! that contract:
//!
//! - [`FrameEncoder`] writes one frame per value into any
//!   [`std::io::Write`] sink;
//! - [`FrameDecoder`] accepts arbitrary byte chunks and yields the
//!   frames they complete, buffering partial tails between chunks;
//! - [`FrameReader`] drives a [`FrameDecoder`] from a
//!   [`std::io::Read`] source as an iterator of values.
//!
//! Partial-frame recovery leans on a single decoder contract: running
//! out of input raises an error whose
//! [`is_incomplete`](tagpack_encoding::decode::Error::is_incomplete)
//! flag is set, and nothing else does.

pub mod reader;
pub mod writer;

pub use reader::{FrameDecoder, FrameDecoderOptions, FrameReader};
pub use writer::{FrameEncoder, FrameEncoderOptions};
