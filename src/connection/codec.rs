//! Wire codec: primitive fields and length-prefixed frames.
//!
//! Every integer is big-endian, every string or blob is prefixed with a 4-byte signed length.
//! A frame is `[i32 length][length bytes]`, the message type tag is the first field of a frame.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::io::{ErrorKind, Read, Write};
use strum_macros::{Display, EnumString};

/// Text encoding used for "encoded" string fields (evaluated code, values, output).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TransferEncoding {
    #[default]
    #[strum(to_string = "UTF-8", serialize = "utf8")]
    Utf8,
    #[strum(to_string = "ISO-8859-1", serialize = "latin1", serialize = "iso8859-1")]
    Latin1,
}

impl TransferEncoding {
    pub fn decode(self, field: &'static str, raw: &[u8]) -> Result<String, Error> {
        match self {
            TransferEncoding::Utf8 => std::str::from_utf8(raw)
                .map(ToOwned::to_owned)
                .map_err(|_| Error::InvalidText(field)),
            TransferEncoding::Latin1 => Ok(raw.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            TransferEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            TransferEncoding::Latin1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }
}

/// Reads message fields from a single frame.
pub struct WireReader {
    buf: Bytes,
    encoding: TransferEncoding,
}

impl WireReader {
    pub fn new(buf: Bytes, encoding: TransferEncoding) -> Self {
        Self { buf, encoding }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn encoding(&self) -> TransferEncoding {
        self.encoding
    }

    fn ensure(&self, field: &'static str, need: usize) -> Result<(), Error> {
        if self.buf.remaining() < need {
            return Err(Error::Truncated {
                field,
                need,
                left: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn get_u16(&mut self, field: &'static str) -> Result<u16, Error> {
        self.ensure(field, 2)?;
        Ok(self.buf.get_u16())
    }

    pub fn get_i16(&mut self, field: &'static str) -> Result<i16, Error> {
        self.ensure(field, 2)?;
        Ok(self.buf.get_i16())
    }

    pub fn get_i32(&mut self, field: &'static str) -> Result<i32, Error> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_i32())
    }

    /// Read a length prefix and check that this many bytes are still in the frame.
    fn get_len(&mut self, field: &'static str) -> Result<usize, Error> {
        let len = self.get_i32(field)?;
        let len = usize::try_from(len).map_err(|_| Error::NegativeLength(len, field))?;
        self.ensure(field, len)?;
        Ok(len)
    }

    /// Read a raw byte blob.
    pub fn get_blob(&mut self, field: &'static str) -> Result<Bytes, Error> {
        let len = self.get_len(field)?;
        Ok(self.buf.split_to(len))
    }

    /// Read a plain (always UTF-8) string.
    pub fn get_string(&mut self, field: &'static str) -> Result<String, Error> {
        let raw = self.get_blob(field)?;
        TransferEncoding::Utf8.decode(field, &raw)
    }

    /// Read a string in the connection transfer encoding.
    pub fn get_text(&mut self, field: &'static str) -> Result<String, Error> {
        let raw = self.get_blob(field)?;
        self.encoding.decode(field, &raw)
    }

    pub fn get_string_list(&mut self, field: &'static str) -> Result<Vec<String>, Error> {
        let count = self.get_i32(field)?;
        let count = usize::try_from(count).map_err(|_| Error::NegativeLength(count, field))?;
        // each element takes at least its own length prefix
        let mut list = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            list.push(self.get_text(field)?);
        }
        Ok(list)
    }
}

/// Writes message fields into a frame body.
pub struct WireWriter {
    buf: BytesMut,
    encoding: TransferEncoding,
}

impl WireWriter {
    pub fn new(encoding: TransferEncoding) -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
            encoding,
        }
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_blob(&mut self, raw: &[u8]) {
        self.buf.put_i32(raw.len() as i32);
        self.buf.put_slice(raw);
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_blob(s.as_bytes());
    }

    pub fn put_text(&mut self, s: &str) {
        let encoded = self.encoding.encode(s);
        self.put_blob(&encoded);
    }

    pub fn put_string_list(&mut self, list: &[String]) {
        self.buf.put_i32(list.len() as i32);
        for s in list {
            self.put_text(s);
        }
    }

    /// Frame body (without the length prefix).
    pub fn into_body(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Fill `buf` from a reader. Returns `false` if the stream ends before the first byte.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Read one frame body. Return `None` if the stream was closed at a frame boundary.
///
/// A negative length is reported before anything is allocated: it almost always means
/// that one side talks TLS and the other doesn't.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Option<Bytes>, Error> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = i32::from_be_bytes(len_buf);
    if len < 0 {
        return Err(Error::NegativeFrameLength(len));
    }
    if len as usize > max_len {
        return Err(Error::FrameTooLarge(len, max_len));
    }

    let mut body = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut body)?;
    Ok(Some(body.freeze()))
}

/// Write length prefix and body as a single buffer and flush it.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<(), Error> {
    let mut frame = BytesMut::with_capacity(body.len() + 4);
    frame.put_i32(body.len() as i32);
    frame.put_slice(body);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}
