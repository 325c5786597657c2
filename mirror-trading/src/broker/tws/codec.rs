//! TWS API framing.
//!
//! Every message is a 4-byte big-endian length followed by NUL-terminated
//! ASCII fields. The connection opens with the `API\0` prefix and a framed
//! client version range.

use std::fmt::Display;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest frame accepted from the terminal.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Sentinel the API uses for "no value" in double fields.
pub const UNSET_DOUBLE: &str = "1.7976931348623157E308";

const API_PREFIX: &[u8] = b"API\0";

/// Prefix a payload with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Opening bytes announcing the supported client version range.
pub fn handshake(min_version: i32, max_version: i32) -> Vec<u8> {
    let mut bytes = API_PREFIX.to_vec();
    bytes.extend(encode_frame(format!("v{min_version}..{max_version}").as_bytes()));
    bytes
}

/// Builds one framed message field by field.
#[derive(Debug, Default)]
pub struct FieldWriter {
    payload: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Display) -> &mut Self {
        self.payload.extend_from_slice(value.to_string().as_bytes());
        self.payload.push(0);
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push(if value { "1" } else { "0" })
    }

    pub fn push_empty(&mut self) -> &mut Self {
        self.payload.push(0);
        self
    }

    /// Optional double; `None` is sent as an empty field.
    pub fn push_opt(&mut self, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.push(v),
            None => self.push_empty(),
        }
    }

    pub fn push_unset_double(&mut self) -> &mut Self {
        self.push(UNSET_DOUBLE)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn finish(&self) -> Vec<u8> {
        encode_frame(&self.payload)
    }
}

/// Split a frame payload into fields.
pub fn split_fields(payload: &[u8]) -> Vec<String> {
    let mut fields: Vec<String> = payload
        .split(|b| *b == 0)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect();
    // A terminated payload leaves one empty tail element
    if payload.last() == Some(&0) {
        fields.pop();
    }
    fields
}

/// Read one framed payload.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Sequential field cursor for decoding.
#[derive(Debug)]
pub struct FieldReader<'a> {
    fields: &'a [String],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a [String]) -> Self {
        Self { fields, pos: 0 }
    }

    pub fn next_str(&mut self) -> Result<&'a str, String> {
        let field = self
            .fields
            .get(self.pos)
            .ok_or_else(|| format!("message truncated at field {}", self.pos))?;
        self.pos += 1;
        Ok(field.as_str())
    }

    pub fn next_i64(&mut self) -> Result<i64, String> {
        let raw = self.next_str()?;
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse()
            .map_err(|_| format!("field {} is not an integer: {raw:?}", self.pos - 1))
    }

    pub fn next_f64(&mut self) -> Result<f64, String> {
        let raw = self.next_str()?;
        if raw.is_empty() {
            return Ok(0.0);
        }
        raw.parse()
            .map_err(|_| format!("field {} is not a number: {raw:?}", self.pos - 1))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), String> {
        for _ in 0..n {
            self.next_str()?;
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.fields.len().saturating_sub(self.pos)
    }
}
