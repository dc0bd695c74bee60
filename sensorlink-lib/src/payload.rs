use crate::error::{Result, SensorError};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Transfer parameters the sensor reports while the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockLayout {
    /// Informational only; blocks are always read as 32 bytes.
    pub block_size: u8,
    pub block_count: u8,
    /// Length of the payload after padding is trimmed
    pub string_length: u8,
}

/// A complete, validated JSON string read from the sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingPayload {
    #[serde(skip)]
    raw: Bytes,
    layout: BlockLayout,
    text: String,
    taken_at: DateTime<Utc>,
}

/// Decode one block. Bytes are not guaranteed to be printable and invalid
/// UTF-8 is replaced rather than rejected.
pub fn decode_block(block: &[u8]) -> String {
    String::from_utf8_lossy(block).into_owned()
}

/// Turn the concatenated block text into the final payload text:
/// NUL padding becomes spaces, then edge whitespace is trimmed.
pub fn clean_text(concatenated: &str) -> String {
    concatenated.replace('\0', " ").trim().to_string()
}

impl ReadingPayload {
    /// Concatenate `blocks` in the given order and validate the result against
    /// the declared string length. A mismatch discards everything.
    pub fn assemble<B: AsRef<[u8]>>(layout: BlockLayout, blocks: &[B]) -> Result<Self> {
        let mut raw = BytesMut::new();
        let mut concatenated = String::new();
        for block in blocks {
            let block = block.as_ref();
            raw.extend_from_slice(block);
            concatenated.push_str(&decode_block(block));
        }

        let text = clean_text(&concatenated);
        let expected = usize::from(layout.string_length);
        let actual = text.chars().count();
        if actual != expected {
            return Err(SensorError::PayloadLengthMismatch { expected, actual });
        }

        Ok(Self {
            raw: raw.freeze(),
            layout,
            text,
            taken_at: Utc::now(),
        })
    }

    /// All block bytes exactly as received, padding included
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    pub fn expected_len(&self) -> usize {
        usize::from(self.layout.string_length)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Parse the payload text as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.text)?)
    }
}

impl fmt::Display for ReadingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
