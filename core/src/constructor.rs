//! Constructor tags and wire-level limits.
//!
//! Every encoded value starts with a single constructor byte which
//! identifies the payload that follows. The assignments in [`Constructor`]
//! are part of the wire format and must never be renumbered.

/// Marker byte announcing an extended (24-bit) length prefix.
pub const LENGTH_EXTENDED: u8 = 254;

/// Reserved length marker, rejected on both ends.
pub const LENGTH_RESERVED: u8 = 255;

/// Largest length a prefix can carry (2^24 − 1).
pub const MAX_LENGTH: usize = (1 << 24) - 1;

/// Strings of at most this many UTF-16 code units are interned
/// through the dictionary instead of being written in place.
pub const SHORT_STRING_LIMIT: usize = 16;

/// Lowest token byte available to extensions.
pub const EXTENSION_TOKEN_MIN: u8 = 35;

/// Highest token byte available to extensions.
pub const EXTENSION_TOKEN_MAX: u8 = 254;

/// Pseudo-token marking a fallback extension.
/// Fallback codecs are tried after all token-carrying ones
/// and emit no token byte of their own.
pub const FALLBACK_TOKEN: i16 = -1;

/// Absolute index of the first word in a fresh dictionary.
/// Index 0 never appears on the wire.
pub const DICTIONARY_BASE: usize = 1;

/// A value constructor tag.
///
/// The discriminants are the exact byte values used on the wire.
/// Codes 21–24 and 26–34 are reserved; codes 35–254 are claimed by
/// extensions and never appear in this enum.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Constructor {
    /// Terminator for `Map` and dynamic `Vector`; transparent elsewhere.
    None = 0,
    /// Length-prefixed raw bytes.
    Binary = 1,
    /// Boolean `false`, carried by the tag alone.
    BoolFalse = 2,
    /// Boolean `true`, carried by the tag alone.
    BoolTrue = 3,
    /// Null, carried by the tag alone.
    Null = 4,
    /// 8-byte little-endian IEEE-754 double of Unix epoch seconds.
    Date = 5,
    /// Length-prefixed sequence of values.
    Vector = 6,
    /// Sequence of values terminated by a `None` tag.
    VectorDynamic = 7,
    /// 4-byte little-endian two's complement.
    Int32 = 8,
    /// 2-byte little-endian two's complement.
    Int16 = 9,
    /// 1-byte two's complement.
    Int8 = 10,
    /// 4-byte little-endian unsigned.
    UInt32 = 11,
    /// 2-byte little-endian unsigned.
    UInt16 = 12,
    /// 1-byte unsigned.
    UInt8 = 13,
    /// 4-byte little-endian IEEE-754.
    Float = 14,
    /// 8-byte little-endian IEEE-754.
    Double = 15,
    /// Sequence of (dictionary key, value) pairs terminated by `None`.
    Map = 16,
    /// Length-prefixed UTF-8 string which registers a new dictionary key.
    DictValue = 17,
    /// Length-prefixed absolute index into the combined dictionary.
    DictIndex = 18,
    /// Length-prefixed UTF-8 bytes.
    String = 19,
    /// Length-prefixed count of additional repetitions of the last scalar.
    Repeat = 20,
    /// Length-prefixed raw-deflate payload holding one complete encoded value.
    Gzip = 25,
}

impl Constructor {
    /// Resolve a tag byte into a known constructor.
    ///
    /// Reserved and extension-range bytes yield `None`.
    pub fn from_u8(tag: u8) -> Option<Constructor> {
        use Constructor::*;
        match tag {
            0 => Some(None),
            1 => Some(Binary),
            2 => Some(BoolFalse),
            3 => Some(BoolTrue),
            4 => Some(Null),
            5 => Some(Date),
            6 => Some(Vector),
            7 => Some(VectorDynamic),
            8 => Some(Int32),
            9 => Some(Int16),
            10 => Some(Int8),
            11 => Some(UInt32),
            12 => Some(UInt16),
            13 => Some(UInt8),
            14 => Some(Float),
            15 => Some(Double),
            16 => Some(Map),
            17 => Some(DictValue),
            18 => Some(DictIndex),
            19 => Some(String),
            20 => Some(Repeat),
            25 => Some(Gzip),
            _ => Option::None,
        }
    }

    /// Whether the whole value is carried by the tag byte itself.
    pub fn is_payloadless(self) -> bool {
        matches!(
            self,
            Constructor::BoolFalse | Constructor::BoolTrue | Constructor::Null
        )
    }
}

impl From<Constructor> for u8 {
    fn from(c: Constructor) -> Self {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_are_stable() {
        assert_eq!(Constructor::UInt8 as u8, 0x0D);
        assert_eq!(Constructor::UInt16 as u8, 0x0C);
        assert_eq!(Constructor::Map as u8, 0x10);
        assert_eq!(Constructor::DictValue as u8, 0x11);
        assert_eq!(Constructor::DictIndex as u8, 0x12);
        assert_eq!(Constructor::String as u8, 0x13);
        assert_eq!(Constructor::Repeat as u8, 0x14);
        assert_eq!(Constructor::Gzip as u8, 0x19);
    }

    #[test]
    fn reserved_codes_do_not_resolve() {
        for tag in (21..=24).chain(26..=34) {
            assert_eq!(Constructor::from_u8(tag), None);
        }
        for tag in 35..=255u8 {
            assert_eq!(Constructor::from_u8(tag), None);
        }
    }

    #[test]
    fn round_trip_through_byte() {
        for tag in 0..=25u8 {
            if let Some(c) = Constructor::from_u8(tag) {
                assert_eq!(u8::from(c), tag);
            }
        }
    }
}
