//! Framed codec for the table protocol.
//!
//! Uses LinesCodec for framing + `FromStr`/`Display` for the message types.
//! Works over any AsyncRead/AsyncWrite (TCP streams, in-memory duplex pipes).

use std::fmt::Display;
use std::io;
use std::marker::PhantomData;
use std::str::FromStr;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::message::{ClientMessage, ParseError, ServerMessage};

/// Longest accepted line, excluding the terminator.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Codec that frames messages as newline-terminated text lines.
///
/// Decodes `In`, encodes `Out`. A line that fails to parse is yielded as
/// `Err(ParseError)` so the reader decides whether to drop it or hang up;
/// only framing and I/O failures end the stream.
pub struct LineCodec<In, Out> {
    inner: LinesCodec,
    _phantom: PhantomData<fn(Out) -> In>,
}

/// Server side: reads client messages, writes grants.
pub type ServerCodec = LineCodec<ClientMessage, ServerMessage>;

/// Client side: reads grants, writes requests and releases.
pub type ClientCodec = LineCodec<ServerMessage, ClientMessage>;

impl<In, Out> Default for LineCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> LineCodec<In, Out> {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            _phantom: PhantomData,
        }
    }

}

fn into_io(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line exceeds maximum length")
        }
    }
}

/// Parse a framed line. LinesCodec has already split the line off the buffer
/// when its UTF-8 check fails, so that failure is a bad line, not a broken stream.
fn parse_line<In>(
    framed: Result<Option<String>, LinesCodecError>,
) -> io::Result<Option<Result<In, ParseError>>>
where
    In: FromStr<Err = ParseError>,
{
    match framed {
        Ok(Some(line)) => {
            tracing::trace!(line = %line, "Decoded line");
            Ok(Some(line.parse()))
        }
        Ok(None) => Ok(None),
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            tracing::trace!(error = %e, "Decoded non-UTF-8 line");
            Ok(Some(Err(ParseError::InvalidUtf8)))
        }
        Err(e) => Err(into_io(e)),
    }
}

impl<In, Out> Decoder for LineCodec<In, Out>
where
    In: FromStr<Err = ParseError>,
{
    type Item = Result<In, ParseError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        parse_line(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        parse_line(self.inner.decode_eof(src))
    }
}

impl<In, Out: Display> Encoder<Out> for LineCodec<In, Out> {
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        tracing::trace!(line = %line, "Encoding line");
        self.inner.encode(line, dst).map_err(into_io)
    }
}
