//! Frame writer module.

use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;
use std::sync::Arc;
use tagpack_core::{Dictionary, Value};
use tagpack_encoding::extensions::ExtensionRegistry;
use tagpack_encoding::{Encoder, EncoderOptions};

/// Module-level error type for frame writing.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The codec rejected the value.
    #[snafu(display("could not encode value into a frame"))]
    EncodeFrame {
        #[snafu(backtrace)]
        source: tagpack_encoding::encode::Error,
    },

    /// The sink rejected the frame bytes.
    #[snafu(display("could not write frame to sink"))]
    WriteFrame {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The sink failed to flush.
    #[snafu(display("could not flush frame sink"))]
    FlushSink {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Type alias for a result from this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction options for a [`FrameEncoder`].
#[derive(Debug, Default)]
pub struct FrameEncoderOptions {
    /// Emit one encoded empty vector at [`FrameEncoder::finish`] when
    /// no frame was written at all.
    pub write_vector_when_empty: bool,
    /// Compress string payloads inside every frame.
    pub gzip: bool,
    /// Seed dictionary shared with the decoding peer.
    pub dictionary: Option<Arc<Dictionary>>,
    /// Custom value codecs.
    pub extensions: ExtensionRegistry,
}

/// Writes one frame per value into a byte sink.
///
/// The underlying encoder is long-lived, so dictionary interning keeps
/// working across frames: a map key first sent in frame 1 costs one
/// index byte in frame 100.
#[derive(Debug)]
pub struct FrameEncoder<W> {
    sink: W,
    encoder: Encoder,
    frames_written: u64,
    write_vector_when_empty: bool,
}

impl<W> FrameEncoder<W>
where
    W: Write,
{
    /// Create a frame encoder over `sink` with default options.
    pub fn new(sink: W) -> Self {
        FrameEncoder::with_options(sink, FrameEncoderOptions::default())
    }

    /// Create a frame encoder over `sink` from the given options.
    pub fn with_options(sink: W, options: FrameEncoderOptions) -> Self {
        let encoder = Encoder::with_options(EncoderOptions {
            gzip: options.gzip,
            dictionary: options.dictionary,
            extensions: options.extensions,
        });
        FrameEncoder {
            sink,
            encoder,
            frames_written: 0,
            write_vector_when_empty: options.write_vector_when_empty,
        }
    }

    /// Encode `value` as one frame and write it through.
    pub fn send(&mut self, value: &Value) -> Result<()> {
        let frame = self.encoder.encode(value).context(EncodeFrameSnafu)?;
        self.sink.write_all(frame).context(WriteFrameSnafu)?;
        self.frames_written += 1;
        Ok(())
    }

    /// The number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush the sink and hand it back, first writing an encoded empty
    /// vector if nothing was sent and the option asks for one.
    pub fn finish(mut self) -> Result<W> {
        if self.frames_written == 0 && self.write_vector_when_empty {
            let frame = self
                .encoder
                .encode(&Value::Vector(Vec::new()))
                .context(EncodeFrameSnafu)?;
            self.sink.write_all(frame).context(WriteFrameSnafu)?;
        }
        self.sink.flush().context(FlushSinkSnafu)?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_frame_per_value() {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.send(&Value::Bool(true)).unwrap();
        encoder.send(&Value::Null).unwrap();
        let sink = encoder.finish().unwrap();
        assert_eq!(sink, [0x03, 0x04]);
    }

    #[test]
    fn empty_stream_stays_empty_by_default() {
        let encoder = FrameEncoder::new(Vec::new());
        assert_eq!(encoder.finish().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn empty_stream_emits_an_empty_vector_when_asked() {
        let options = FrameEncoderOptions {
            write_vector_when_empty: true,
            ..FrameEncoderOptions::default()
        };
        let encoder = FrameEncoder::with_options(Vec::new(), options);
        assert_eq!(encoder.finish().unwrap(), [0x06, 0x00]);
    }

    #[test]
    fn a_sent_frame_suppresses_the_empty_vector() {
        let options = FrameEncoderOptions {
            write_vector_when_empty: true,
            ..FrameEncoderOptions::default()
        };
        let mut encoder = FrameEncoder::with_options(Vec::new(), options);
        encoder.send(&Value::from(1)).unwrap();
        assert_eq!(encoder.finish().unwrap(), [0x0D, 0x01]);
    }
}
