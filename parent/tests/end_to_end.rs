//! End-to-end exercises through the umbrella crate: a shared seed
//! dictionary, extensions and framing working together across a
//! chunked transport.

use std::sync::Arc;
use tagpack::encoding::extensions::{ExtensionCodec, ExtensionError};
use tagpack::stream::reader::FrameDecoderOptions;
use tagpack::stream::writer::FrameEncoderOptions;
use tagpack::{
    Custom, Dictionary, Extension, ExtensionRegistry, FrameDecoder, FrameEncoder, Map, Value,
};

#[derive(Debug)]
struct InstantCodec;

impl ExtensionCodec for InstantCodec {
    fn encode(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Custom(c) if c.name == "instant" => Some((*c.body).clone()),
            _ => None,
        }
    }

    fn decode(&self, lowered: Value) -> Result<Value, ExtensionError> {
        match lowered {
            Value::UInt(_) | Value::Int(_) => Ok(Value::Custom(Custom::new("instant", lowered))),
            other => Err(ExtensionError::new(format!(
                "expected an integer tick count, got {}",
                other.kind()
            ))),
        }
    }
}

fn sample_record(seq: u64) -> Value {
    let mut map = Map::new();
    map.insert("seq", seq);
    map.insert("source", "sensor-7");
    map.insert("ok", seq % 2 == 0);
    map.insert(
        "readings",
        Value::Vector(vec![Value::F64(0.5), Value::F64(0.5), Value::F64(1.25)]),
    );
    map.insert("stamp", Value::Custom(Custom::new("instant", Value::UInt(seq * 100))));
    Value::Map(map)
}

fn registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry.register(Extension::new(50, Box::new(InstantCodec)).unwrap());
    registry
}

#[test]
fn records_survive_a_chunked_transport() {
    let seed = Arc::new(Dictionary::from_words(vec![
        "seq", "source", "ok", "readings", "stamp",
    ]));

    let mut encoder = FrameEncoder::with_options(
        Vec::new(),
        FrameEncoderOptions {
            dictionary: Some(Arc::clone(&seed)),
            extensions: registry(),
            ..FrameEncoderOptions::default()
        },
    );
    let records: Vec<Value> = (0..20).map(sample_record).collect();
    for record in &records {
        encoder.send(record).unwrap();
    }
    let wire = encoder.finish().unwrap();

    // replay the wire bytes in awkward 7-byte chunks
    let mut decoder = FrameDecoder::with_options(FrameDecoderOptions {
        dictionary: Some(seed),
        extensions: registry(),
    });
    let mut decoded = Vec::new();
    for chunk in wire.chunks(7) {
        decoded.extend(decoder.feed(chunk).unwrap());
    }
    assert!(!decoder.has_pending());
    assert_eq!(decoded, records);
}

#[test]
fn seeded_keys_make_later_frames_small() {
    let seed = Arc::new(Dictionary::from_words(vec![
        "seq", "source", "ok", "readings", "stamp",
    ]));
    let mut seeded = FrameEncoder::with_options(
        Vec::new(),
        FrameEncoderOptions {
            dictionary: Some(seed),
            extensions: registry(),
            ..FrameEncoderOptions::default()
        },
    );
    let mut bare = FrameEncoder::with_options(
        Vec::new(),
        FrameEncoderOptions {
            extensions: registry(),
            ..FrameEncoderOptions::default()
        },
    );

    let record = sample_record(1);
    seeded.send(&record).unwrap();
    bare.send(&record).unwrap();
    assert!(seeded.finish().unwrap().len() < bare.finish().unwrap().len());
}
