//! IRC line codec — frames a TCP byte stream into IRC messages.
//!
//! Splits on newline boundaries (`\r\n` per RFC 2812, with a bare `\n`
//! accepted for interoperability), parses each line into a [`Message`], and
//! serializes outgoing messages with `\r\n` termination.
//!
//! Malformed lines are logged and dropped rather than surfaced as stream
//! errors — bad protocol input never terminates a connection; only transport
//! failure does. Oversized lines are skipped the same way.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{error, warn};

use crate::message::Message;

/// Maximum line length (including the terminator). RFC 2812 says 512 bytes;
/// plenty of servers exceed it, so the cap here is only a flood guard.
const MAX_LINE_LENGTH: usize = 8191;

/// A tokio codec that frames IRC messages on newline boundaries.
///
/// Invalid and oversized lines are skipped (logged + discarded) instead of
/// returning a fatal error, so one garbage line never kills the session.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// True when we're discarding an oversized line and waiting for its
    /// terminator.
    skipping: bool,
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, io::Error> {
        loop {
            // If we're in skip mode (discarding an oversized line that didn't
            // have its terminator yet), scan for the terminator first.
            if self.skipping {
                match src.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        warn!(bytes = pos + 1, "codec: finished skipping oversized line tail");
                        src.advance(pos + 1);
                        self.skipping = false;
                    }
                    None => {
                        // Still no terminator. Discard everything and wait.
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            let Some(nl) = src.iter().position(|&b| b == b'\n') else {
                // No complete line yet. Check if the buffer is getting huge.
                if src.len() > MAX_LINE_LENGTH {
                    warn!(
                        bytes = src.len(),
                        "codec: discarding oversized partial line, waiting for terminator"
                    );
                    src.clear();
                    self.skipping = true;
                }
                return Ok(None);
            };

            if nl > MAX_LINE_LENGTH {
                // Complete oversized line — skip it entirely.
                warn!(bytes = nl, "codec: skipped oversized IRC line");
                src.advance(nl + 1);
                continue;
            }

            let line_bytes = src.split_to(nl);
            src.advance(1); // the \n

            // Lossy decode: a stray non-UTF-8 byte in one nick should not
            // cost us the line, let alone the connection.
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            match Message::parse(line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    error!(line, error = %e, "codec: dropped invalid message");
                    continue;
                }
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        let wire = item.to_wire();
        dst.reserve(wire.len() + 2);
        dst.put_slice(wire.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
