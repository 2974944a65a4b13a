//! Line protocol between philosophers and the table.
//!
//! - **message**: `REQUEST`/`DONE` from clients, `GRANTED` from the server
//! - **codec**: newline framing for AsyncRead/AsyncWrite

pub mod codec;
pub mod message;

pub use codec::{ClientCodec, DEFAULT_MAX_LINE_LENGTH, LineCodec, ServerCodec};
pub use message::{ClientMessage, ParseError, ServerMessage};
