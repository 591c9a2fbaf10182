//! String tables.
//!
//! Non-sparse layouts store strings as 32-bit offsets into a block of
//! null-terminated strings that starts with the empty string. WDBC through
//! WDC1 offsets are absolute into that block. WDC2 and WDC3 offsets are
//! relative to the field's position in a virtual region made of every
//! section's records followed by every section's string table.

use std::collections::HashMap;

use wire::EncodeError;

/// Concatenated string tables of every section, as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringBlock {
    bytes: Vec<u8>,
}

impl StringBlock {
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Appends one section's string table.
    pub fn push_table(&mut self, table: &[u8]) {
        self.bytes.extend_from_slice(table);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the string starting at `pos`.
    ///
    /// An empty block resolves position 0 to the empty string, so tables
    /// that omit their string region still read.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<String> {
        if pos == 0 && self.bytes.is_empty() {
            return Some(String::new());
        }
        let tail = self.bytes.get(pos..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// Resolves a field-relative offset.
    ///
    /// `field_position` is the field's byte position in the virtual record
    /// region and `records_len` that region's total length.
    #[must_use]
    pub fn get_relative(
        &self,
        stored: u32,
        field_position: usize,
        records_len: usize,
    ) -> Option<String> {
        let pos = i64::from(stored) + field_position as i64 - records_len as i64;
        usize::try_from(pos).ok().and_then(|pos| self.get(pos))
    }
}

/// Interning string table for writers.
///
/// Offsets are handed out in first-intern order; the empty string is always
/// offset 0.
#[derive(Debug, Clone)]
pub struct StringTableBuilder {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: vec![0],
            offsets: HashMap::new(),
        }
    }

    /// Returns the offset of `value`, appending it if new.
    pub fn intern(&mut self, value: &str) -> Result<u32, EncodeError> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.offsets.get(value) {
            return Ok(offset);
        }
        let offset = u32::try_from(self.bytes.len()).map_err(|_| EncodeError::ValueOverflow {
            field: "string table offset",
            value: self.bytes.len() as u64,
        })?;
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Never true: the table always holds the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_dedups_and_reserves_empty() {
        let mut table = StringTableBuilder::new();
        assert_eq!(table.intern("").unwrap(), 0);
        let a = table.intern("Sword").unwrap();
        let b = table.intern("Shield").unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 7);
        assert_eq!(table.intern("Sword").unwrap(), a);
        assert_eq!(table.as_bytes(), b"\0Sword\0Shield\0");
    }

    #[test]
    fn block_reads_back_builder() {
        let mut table = StringTableBuilder::new();
        let offset = table.intern("hello").unwrap();
        let block = StringBlock::new(table.into_bytes());
        assert_eq!(block.get(offset as usize).as_deref(), Some("hello"));
        assert_eq!(block.get(0).as_deref(), Some(""));
        assert_eq!(block.get(100), None);
    }

    #[test]
    fn section_tables_concatenate() {
        let mut block = StringBlock::default();
        block.push_table(b"\0Gnome\0");
        block.push_table(b"");
        block.push_table(b"Dwarf\0");
        assert_eq!(block.len(), 13);
        assert_eq!(block.get(1).as_deref(), Some("Gnome"));
        assert_eq!(block.get(7).as_deref(), Some("Dwarf"));
    }

    #[test]
    fn unterminated_tail_is_rejected() {
        let block = StringBlock::new(b"\0abc".to_vec());
        assert_eq!(block.get(1), None);
    }

    #[test]
    fn empty_block_reads_offset_zero() {
        let block = StringBlock::default();
        assert_eq!(block.get(0).as_deref(), Some(""));
        assert_eq!(block.get(1), None);
    }

    #[test]
    fn relative_offsets() {
        // Two 8-byte records, field at byte 4 of record 1; string at block pos 3.
        let block = StringBlock::new(b"\0a\0bc\0".to_vec());
        let records_len = 16;
        let field_position = 8 + 4;
        let stored = (records_len + 3 - field_position) as u32;
        assert_eq!(
            block.get_relative(stored, field_position, records_len).as_deref(),
            Some("bc")
        );
        assert_eq!(block.get_relative(0, 0, records_len), None);
    }
}
