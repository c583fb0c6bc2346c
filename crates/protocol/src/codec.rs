//! Frame encoder/decoder bound to one [`ProtocolTable`].

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{DecodeError, EncodingError};
use crate::message::Message;
use crate::table::{BodyClass, ProtocolTable, TableEntry};
use crate::MAX_VARIABLE_BODY;

/// Encodes and decodes frames according to a fixed protocol table.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    table: &'static ProtocolTable,
}

impl Codec {
    pub fn new(table: &'static ProtocolTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &'static ProtocolTable {
        self.table
    }

    /// Checks a message against the table without encoding it.
    pub fn check(&self, msg: &Message) -> Result<&'static TableEntry, EncodingError> {
        let entry = self
            .table
            .by_packet(msg.packet)
            .ok_or(EncodingError::UnsupportedPacket {
                packet: msg.packet,
                version: self.table.version(),
            })?;

        let actual = msg.body.len();
        match entry.body {
            BodyClass::None if actual != 0 => Err(EncodingError::UnexpectedBody {
                packet: msg.packet,
                actual,
            }),
            BodyClass::Fixed(expected) if actual != expected => Err(EncodingError::FixedLength {
                packet: msg.packet,
                expected,
                actual,
            }),
            BodyClass::Variable if actual > MAX_VARIABLE_BODY => Err(EncodingError::TooLong {
                packet: msg.packet,
                actual,
            }),
            _ => Ok(entry),
        }
    }

    /// Encodes a message into a new frame buffer.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::with_capacity(2 + msg.body.len());
        self.encode_into(msg, &mut buf)?;
        Ok(buf)
    }

    /// Appends the frame for `msg` to `buf`. Nothing is appended on error.
    pub fn encode_into(&self, msg: &Message, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let entry = self.check(msg)?;
        buf.push(entry.tag);
        if entry.body == BodyClass::Variable {
            // Length fits: check() rejected anything above MAX_VARIABLE_BODY.
            buf.push(msg.body.len() as u8);
        }
        buf.extend_from_slice(&msg.body);
        Ok(())
    }

    /// Reads one frame from the stream.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a tag byte.
    /// A stream that ends inside a frame yields an `UnexpectedEof` I/O error.
    pub async fn decode<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Option<Message>, DecodeError> {
        let mut tag = [0u8; 1];
        match reader.read(&mut tag).await {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            // A TLS peer that hangs up between frames without close_notify.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let tag = tag[0];

        let entry = self.table.by_tag(tag).ok_or(DecodeError::UnknownPacket(tag))?;
        let len = match entry.body {
            BodyClass::None => return Ok(Some(Message::bodiless(entry.packet))),
            BodyClass::Fixed(len) => len,
            BodyClass::Variable => reader.read_u8().await? as usize,
        };

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok(Some(Message::new(entry.packet, body)))
    }
}
