#![crate_type = "lib"]
#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! This is the core tagpack library, containing the value model, the
//! constructor tag table and the interning dictionary that the encoder
//! and decoder crates build on.
//!

pub mod constructor;
pub mod dictionary;
pub mod error;
pub mod value;

pub use constructor::Constructor;
pub use dictionary::Dictionary;
pub use error::CastValueError;
pub use value::{Custom, Map, Value};
