use chrono::{DateTime, Utc};

use crate::common::{BasaltError, Result};

/// A fixed-size byte buffer with typed, offset-addressed accessors.
///
/// A page has no identity beyond its contents and no knowledge of records
/// or schema; offset semantics belong to the record layer above. All
/// multi-byte integers are little-endian so that on-disk bytes are
/// endian-stable across hosts. Strings are stored as UTF-16 code units
/// behind a 4-byte byte-length prefix, raw byte arrays behind the same
/// kind of prefix.
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Creates a zeroed page of exactly `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0u8; block_size].into_boxed_slice(),
        }
    }

    /// Wraps an existing buffer (used when decoding log records).
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check_write(&self, offset: usize, len: usize) -> Result<()> {
        if offset + len > self.data.len() {
            return Err(BasaltError::PageOverflow {
                offset,
                len,
                page_size: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        debug_assert!(offset + 4 <= self.data.len());
        i32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_int(&mut self, offset: usize, val: i32) -> Result<()> {
        self.check_write(offset, 4)?;
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    pub fn get_long(&self, offset: usize) -> i64 {
        debug_assert!(offset + 8 <= self.data.len());
        i64::from_le_bytes(self.data[offset..offset + 8].try_into().unwrap())
    }

    pub fn set_long(&mut self, offset: usize, val: i64) -> Result<()> {
        self.check_write(offset, 8)?;
        self.data[offset..offset + 8].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    pub fn get_bool(&self, offset: usize) -> bool {
        debug_assert!(offset < self.data.len());
        self.data[offset] != 0
    }

    pub fn set_bool(&mut self, offset: usize, val: bool) -> Result<()> {
        self.check_write(offset, 1)?;
        self.data[offset] = val as u8;
        Ok(())
    }

    /// Reads one bit out of the 4-byte field at `offset`. Bit fields hold
    /// up to 32 flags (nullability markers in the record layer).
    pub fn get_bit(&self, offset: usize, bit: u32) -> bool {
        debug_assert!(bit < 32);
        (self.get_int(offset) >> bit) & 1 == 1
    }

    /// Sets or clears one bit inside the 4-byte field at `offset`.
    pub fn set_bit(&mut self, offset: usize, bit: u32, val: bool) -> Result<()> {
        debug_assert!(bit < 32);
        let field = self.get_int(offset);
        let field = if val {
            field | (1 << bit)
        } else {
            field & !(1 << bit)
        };
        self.set_int(offset, field)
    }

    /// Reads a tick-encoded timestamp (microseconds since the Unix epoch).
    pub fn get_datetime(&self, offset: usize) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_micros(self.get_long(offset)).unwrap_or_default()
    }

    pub fn set_datetime(&mut self, offset: usize, val: DateTime<Utc>) -> Result<()> {
        self.set_long(offset, val.timestamp_micros())
    }

    pub fn get_bytes(&self, offset: usize) -> &[u8] {
        let len = self.get_int(offset) as usize;
        debug_assert!(offset + 4 + len <= self.data.len());
        &self.data[offset + 4..offset + 4 + len]
    }

    pub fn set_bytes(&mut self, offset: usize, val: &[u8]) -> Result<()> {
        self.check_write(offset, 4 + val.len())?;
        self.set_int(offset, val.len() as i32)?;
        self.data[offset + 4..offset + 4 + val.len()].copy_from_slice(val);
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> String {
        let bytes = self.get_bytes(offset);
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }

    pub fn set_string(&mut self, offset: usize, val: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(val.len() * 2);
        for unit in val.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        self.set_bytes(offset, &bytes)
    }

    /// Exact number of bytes `set_string` will occupy for this text.
    pub fn string_size(text: &str) -> usize {
        4 + text.encode_utf16().count() * 2
    }

    /// Worst-case encoded size for a string of `chars` characters. A char
    /// outside the BMP takes two UTF-16 code units, hence 4 bytes each.
    pub fn max_length(chars: usize) -> usize {
        4 + chars * 4
    }
}
