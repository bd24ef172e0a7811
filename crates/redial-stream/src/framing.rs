//! Frame boundaries on the byte stream.
//!
//! A [`Framing`] splits incoming bytes into frames and wraps outgoing payloads.
//! Every tokio-util codec producing `BytesMut` frames and accepting `Bytes`
//! payloads is a framing, so [`LengthDelimitedCodec`] works as is:
//!
//! ```
//! use redial_stream::{LineFraming, StreamSession};
//! use tokio_util::codec::LengthDelimitedCodec;
//!
//! let lines = StreamSession::<String, String>::builder().framing(LineFraming::new().max_length(4096));
//! let length_prefixed = StreamSession::<String, String>::builder().framing(LengthDelimitedCodec::new());
//! # let _ = (lines, length_prefixed);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

pub use tokio_util::codec::LengthDelimitedCodec;

/// Splits a byte stream into frames and wraps payloads into frames.
///
/// Each session uses two instances: one for the reader and one for the writer.
pub trait Framing: Send + 'static {
    /// Extracts the next complete frame from `buf`, if any.
    fn decode_frame(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>>;

    /// Extracts a frame once the peer has stopped sending.
    fn decode_last(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>>;

    /// Appends the framed `payload` to `dst`.
    fn encode_frame(&mut self, payload: Bytes, dst: &mut BytesMut) -> io::Result<()>;

    /// Returns a fresh instance with the same settings.
    fn boxed_clone(&self) -> Box<dyn Framing>;
}

impl<C> Framing for C
where
    C: Decoder<Item = BytesMut, Error = io::Error>
        + Encoder<Bytes, Error = io::Error>
        + Clone
        + Send
        + 'static,
{
    fn decode_frame(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        self.decode(buf)
    }

    fn decode_last(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        self.decode_eof(buf)
    }

    fn encode_frame(&mut self, payload: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        self.encode(payload, dst)
    }

    fn boxed_clone(&self) -> Box<dyn Framing> {
        Box::new(self.clone())
    }
}

/// Newline-delimited frames; the default framing.
///
/// A trailing `\r` is stripped from incoming lines. Outgoing payloads must
/// not contain `\n`.
#[derive(Debug, Clone, Default)]
pub struct LineFraming {
    max_length: Option<usize>,
    next_index: usize,
}

impl LineFraming {
    /// Creates a framing accepting lines of any length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects lines longer than `max` bytes, excluding the terminator.
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    fn check_length(&self, len: usize) -> io::Result<()> {
        match self.max_length {
            Some(max) if len > max => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line of {len} bytes exceeds the maximum of {max}"),
            )),
            _ => Ok(()),
        }
    }
}

impl Decoder for LineFraming {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');
        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                self.check_length(end)?;

                let mut line = buf.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                Ok(Some(line))
            }
            None => {
                // Only scan the new bytes next time.
                self.next_index = buf.len();
                self.check_length(buf.len())?;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let mut line = buf.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Ok(Some(line))
    }
}

impl Encoder<Bytes> for LineFraming {
    type Error = io::Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), io::Error> {
        if payload.contains(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line payload contains a newline",
            ));
        }
        self.check_length(payload.len())?;
        dst.reserve(payload.len() + 1);
        dst.put(payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
