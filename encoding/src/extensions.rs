//! Registration and dispatch of custom value codecs.
//!
//! An extension pairs a token byte in the range 35–254 with a codec that
//! knows how to *lower* a host value into a core value on encode and to
//! rebuild it from the decoded lowered value on the other end. The
//! encoder writes the token byte followed by the lowered value through
//! the core codec, so an extension never touches raw bytes.
//!
//! A *fallback* extension carries no token of its own: it is tried after
//! every token-carrying extension and its lowered value is written
//! without a token byte, so a peer without the extension still decodes
//! it as a plain core value.

use snafu::{ensure, Snafu};
use std::fmt::Debug;
use tagpack_core::constructor::{EXTENSION_TOKEN_MAX, EXTENSION_TOKEN_MIN, FALLBACK_TOKEN};
use tagpack_core::Value;

/// Error raised when constructing an extension with a reserved or
/// out-of-range token.
#[derive(Debug, Snafu)]
#[snafu(display(
    "extension token {} is reserved or out of range (valid: -1 or 35..=254)",
    token
))]
pub struct InvalidTokenError {
    token: i16,
}

/// Error raised by an extension codec that could not rebuild a value.
#[derive(Debug, Snafu)]
#[snafu(display("extension codec failed: {}", message))]
pub struct ExtensionError {
    message: String,
}

impl ExtensionError {
    /// Build an extension error from a cause description.
    pub fn new(message: impl Into<String>) -> Self {
        ExtensionError {
            message: message.into(),
        }
    }
}

/// A codec for one host-defined value shape.
///
/// `encode` must lower the value to a *core* value (anything but
/// [`Value::Custom`]); lowering to another custom value would loop the
/// dispatch back into the extension table.
pub trait ExtensionCodec: Debug {
    /// Lower a host value into a core value, or `None` to pass.
    fn encode(&self, value: &Value) -> Option<Value>;

    /// Rebuild the host value from its decoded lowered form.
    fn decode(&self, lowered: Value) -> Result<Value, ExtensionError>;
}

/// A registered extension: a codec bound to its wire token.
#[derive(Debug)]
pub struct Extension {
    token: Option<u8>,
    codec: Box<dyn ExtensionCodec>,
}

impl Extension {
    /// Bind `codec` to `token`.
    ///
    /// The token must be [`FALLBACK_TOKEN`] or fall in
    /// `EXTENSION_TOKEN_MIN..=EXTENSION_TOKEN_MAX`; anything else is
    /// rejected eagerly.
    pub fn new(token: i16, codec: Box<dyn ExtensionCodec>) -> Result<Self, InvalidTokenError> {
        if token == FALLBACK_TOKEN {
            return Ok(Extension { token: None, codec });
        }
        ensure!(
            (i16::from(EXTENSION_TOKEN_MIN)..=i16::from(EXTENSION_TOKEN_MAX)).contains(&token),
            InvalidTokenSnafu { token }
        );
        Ok(Extension {
            token: Some(token as u8),
            codec,
        })
    }

    /// Bind `codec` as a fallback extension.
    pub fn fallback(codec: Box<dyn ExtensionCodec>) -> Self {
        Extension { token: None, codec }
    }

    /// The wire token, or `None` for a fallback extension.
    pub fn token(&self) -> Option<u8> {
        self.token
    }

    /// Whether this extension is a fallback.
    pub fn is_fallback(&self) -> bool {
        self.token.is_none()
    }

    pub(crate) fn lower(&self, value: &Value) -> Option<Value> {
        self.codec.encode(value)
    }

    pub(crate) fn rebuild(&self, lowered: Value) -> Result<Value, ExtensionError> {
        self.codec.decode(lowered)
    }
}

/// An ordered table of extensions shared by an encoder/decoder pair.
///
/// Encode dispatch tries token-carrying extensions in registration
/// order, then fallbacks in registration order; the first codec to
/// lower the value wins. Decode dispatch resolves the token byte read
/// from the stream.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: Vec<Extension>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Append an extension to the registry.
    pub fn register(&mut self, extension: Extension) {
        self.entries.push(extension);
    }

    /// The number of registered extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn by_token(&self, token: u8) -> Option<&Extension> {
        self.entries.iter().find(|e| e.token == Some(token))
    }

    pub(crate) fn encode_candidates(&self) -> impl Iterator<Item = &Extension> {
        self.entries
            .iter()
            .filter(|e| !e.is_fallback())
            .chain(self.entries.iter().filter(|e| e.is_fallback()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Passthrough;

    impl ExtensionCodec for Passthrough {
        fn encode(&self, _value: &Value) -> Option<Value> {
            None
        }

        fn decode(&self, lowered: Value) -> Result<Value, ExtensionError> {
            Ok(lowered)
        }
    }

    #[test]
    fn reserved_tokens_are_rejected() {
        for token in [0, 1, 16, 25, 34] {
            assert!(Extension::new(token, Box::new(Passthrough)).is_err());
        }
        for token in [-2, 255, 300] {
            assert!(Extension::new(token, Box::new(Passthrough)).is_err());
        }
    }

    #[test]
    fn valid_tokens_are_accepted() {
        assert_eq!(
            Extension::new(35, Box::new(Passthrough)).unwrap().token(),
            Some(35)
        );
        assert_eq!(
            Extension::new(254, Box::new(Passthrough)).unwrap().token(),
            Some(254)
        );
        assert!(Extension::new(-1, Box::new(Passthrough)).unwrap().is_fallback());
    }

    #[test]
    fn fallbacks_are_tried_last() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Extension::fallback(Box::new(Passthrough)));
        registry.register(Extension::new(40, Box::new(Passthrough)).unwrap());

        let order: Vec<_> = registry.encode_candidates().map(Extension::token).collect();
        assert_eq!(order, vec![Some(40), None]);
    }
}
