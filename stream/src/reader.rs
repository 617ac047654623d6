//! Frame reader module.
//!
//! [`FrameDecoder`] is the push-based accumulator at the heart of the
//! framing layer: it is fed arbitrary chunks of bytes and yields every
//! complete frame they contain, holding on to a partial tail until the
//! next chunk arrives. [`FrameReader`] wraps it around any
//! [`std::io::Read`] source.

use snafu::{Backtrace, ResultExt, Snafu};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::mem;
use std::sync::Arc;
use tagpack_core::{Dictionary, Value};
use tagpack_encoding::extensions::ExtensionRegistry;
use tagpack_encoding::Decoder;
use tracing::trace;

/// Module-level error type for frame reading.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// A frame failed to decode for a reason other than truncation.
    #[snafu(display("could not decode frame at stream offset {}", offset))]
    DecodeFrame {
        offset: u64,
        #[snafu(backtrace)]
        source: tagpack_encoding::decode::Error,
    },

    /// The byte source failed.
    #[snafu(display("could not read from frame source"))]
    ReadSource {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The source ended in the middle of a frame.
    #[snafu(display("stream ended with {} byte(s) of an unfinished frame", len))]
    TruncatedStream { len: usize, backtrace: Backtrace },
}

/// Type alias for a result from this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction options for a [`FrameDecoder`] or [`FrameReader`].
#[derive(Debug, Default)]
pub struct FrameDecoderOptions {
    /// Seed dictionary shared with the encoding peer.
    pub dictionary: Option<Arc<Dictionary>>,
    /// Custom value codecs.
    pub extensions: ExtensionRegistry,
}

/// A push-based accumulator turning byte chunks into decoded frames.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    stream_offset: u64,
    seed: Option<Arc<Dictionary>>,
    dictionary: Dictionary,
    extensions: Arc<ExtensionRegistry>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new()
    }
}

impl FrameDecoder {
    /// Create a frame decoder with no seed dictionary and no
    /// extensions.
    pub fn new() -> Self {
        FrameDecoder::with_options(FrameDecoderOptions::default())
    }

    /// Create a frame decoder from the given options.
    pub fn with_options(options: FrameDecoderOptions) -> Self {
        let dictionary = match &options.dictionary {
            Some(seed) => Dictionary::with_base(seed.end()),
            None => Dictionary::new(),
        };
        FrameDecoder {
            pending: Vec::new(),
            stream_offset: 0,
            seed: options.dictionary,
            dictionary,
            extensions: Arc::new(options.extensions),
        }
    }

    /// Feed one chunk, returning every frame it completed.
    ///
    /// A frame cut short by the end of the chunk is buffered and
    /// finished by later chunks. Any decode failure other than an
    /// incomplete frame is a hard error and poisons no state beyond
    /// the current chunk boundary: the undecodable bytes stay pending.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>> {
        self.pending.extend_from_slice(chunk);
        let mut values = Vec::new();
        let mut consumed = 0;
        while consumed < self.pending.len() {
            let extended = mem::take(&mut self.dictionary);
            let mut decoder = Decoder::resume(
                &self.pending[consumed..],
                self.seed.clone(),
                extended,
                Arc::clone(&self.extensions),
            );
            let outcome = decoder.read_object();
            let used = decoder.position();
            self.dictionary = decoder.into_dictionary();
            match outcome {
                Ok(value) => {
                    consumed += used;
                    values.push(value);
                }
                Err(e) if e.is_incomplete() => {
                    trace!(
                        pending = self.pending.len() - consumed,
                        "buffering partial frame"
                    );
                    break;
                }
                Err(e) => {
                    let offset = self.stream_offset + consumed as u64;
                    self.drop_consumed(consumed);
                    return Err(e).context(DecodeFrameSnafu { offset });
                }
            }
        }
        self.drop_consumed(consumed);
        Ok(values)
    }

    /// The number of buffered bytes still waiting for the rest of
    /// their frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether a partial frame is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn drop_consumed(&mut self, consumed: usize) {
        self.pending.drain(..consumed);
        self.stream_offset += consumed as u64;
    }
}

/// Pulls chunks from a byte source and yields decoded frames.
///
/// Iteration ends after the source is exhausted; a source that ends in
/// the middle of a frame yields a final [`Error::TruncatedStream`].
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    decoder: FrameDecoder,
    ready: VecDeque<Value>,
    done: bool,
}

const READ_CHUNK_SIZE: usize = 8 * 1024;

impl<R> FrameReader<R>
where
    R: Read,
{
    /// Create a frame reader over `source` with default options.
    pub fn new(source: R) -> Self {
        FrameReader::with_options(source, FrameDecoderOptions::default())
    }

    /// Create a frame reader over `source` from the given options.
    pub fn with_options(source: R, options: FrameDecoderOptions) -> Self {
        FrameReader {
            source,
            decoder: FrameDecoder::with_options(options),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<R> Iterator for FrameReader<R>
where
    R: Read,
{
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(value) = self.ready.pop_front() {
                return Some(Ok(value));
            }
            if self.done {
                if self.decoder.has_pending() {
                    let len = self.decoder.pending_len();
                    self.decoder = FrameDecoder::new();
                    return Some(TruncatedStreamSnafu { len }.fail());
                }
                return None;
            }
            match self.source.read(&mut chunk) {
                Ok(0) => {
                    self.done = true;
                }
                Ok(n) => match self.decoder.feed(&chunk[..n]) {
                    Ok(values) => self.ready.extend(values),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e).context(ReadSourceSnafu));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagpack_core::Map;
    use tagpack_encoding::encode;

    #[test]
    fn whole_frames_come_out_of_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let values = decoder.feed(&[0x03, 0x04, 0x0D, 0x2A]).unwrap();
        assert_eq!(
            values,
            vec![Value::Bool(true), Value::Null, Value::UInt(42)]
        );
        assert!(!decoder.has_pending());
    }

    #[test]
    fn a_split_frame_is_finished_by_the_next_chunk() {
        let mut map = Map::new();
        map.insert("answer", 42);
        let frame = encode(&Value::Map(map.clone())).unwrap();

        let mut decoder = FrameDecoder::new();
        let (head, tail) = frame.split_at(3);
        assert_eq!(decoder.feed(head).unwrap(), vec![]);
        assert!(decoder.has_pending());
        let values = decoder.feed(tail).unwrap();
        assert_eq!(values, vec![Value::Map(map)]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn byte_at_a_time_delivery_still_decodes() {
        let frame = encode(&Value::Vector(vec![
            Value::from("a rather long string that stays inline"),
            Value::from(7),
            Value::from(7),
        ]))
        .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut values = Vec::new();
        for byte in &frame {
            values.extend(decoder.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_vector().unwrap().len(), 3);
    }

    #[test]
    fn dictionary_state_carries_across_frames() {
        let mut map = Map::new();
        map.insert("key", 1);
        let mut encoder = tagpack_encoding::Encoder::new();
        let first = encoder.encode(&Value::Map(map.clone())).unwrap().to_vec();
        let second = encoder.encode(&Value::Map(map.clone())).unwrap().to_vec();
        // the second frame references the key by index
        assert!(second.len() < first.len());

        let mut decoder = FrameDecoder::new();
        let mut stream = first;
        stream.extend_from_slice(&second);
        let values = decoder.feed(&stream).unwrap();
        assert_eq!(values, vec![Value::Map(map.clone()), Value::Map(map)]);
    }

    #[test]
    fn hard_errors_propagate_with_their_stream_offset() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(&[0x15]).unwrap_err();
        assert!(matches!(err, Error::DecodeFrame { offset: 0, .. }));
    }

    #[test]
    fn frame_reader_iterates_a_source() {
        let mut stream = Vec::new();
        for value in [Value::Bool(true), Value::from(300), Value::Null] {
            stream.extend_from_slice(&encode(&value).unwrap());
        }
        let reader = FrameReader::new(&stream[..]);
        let values: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![Value::Bool(true), Value::UInt(300), Value::Null]);
    }

    #[test]
    fn frame_reader_reports_a_truncated_stream() {
        let frame = encode(&Value::from(300)).unwrap();
        let truncated = &frame[..frame.len() - 1];
        let mut reader = FrameReader::new(truncated);
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::TruncatedStream { len: 2, .. }));
        assert!(reader.next().is_none());
    }
}
