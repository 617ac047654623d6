#![crate_type = "lib"]
#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! This crate contains the tagpack encoding and decoding primitives:
//! the stateful [`Encoder`] and [`Decoder`] over the constructor-tagged
//! wire format, and the [`extensions`] registry that lets applications
//! plug custom value codecs into the same byte stream.
//!
//! One [`Encoder::encode`] call produces one self-contained frame;
//! [`Decoder::decode`] reads one frame back. Peers that keep their
//! codec instances alive (or share a seed [`Dictionary`]) amortize map
//! keys and short strings down to small dictionary indices.
//!
//! [`Dictionary`]: tagpack_core::Dictionary

pub mod decode;
pub mod encode;
pub mod extensions;

pub use decode::{decode, Decoder, DecoderOptions};
pub use encode::{encode, Encoder, EncoderOptions};
pub use extensions::{Extension, ExtensionCodec, ExtensionRegistry};
