// Copyright (c) 2024 Mesh Overlay Contributors

//! Canonical, deterministic, length-prefixed binary encoding used wherever
//! this spec requires signatures over "canonicalization of all other
//! fields": descriptor signing (§4.3) and control envelope signing (§4.5).
//!
//! Every field is written as `u32` little-endian length followed by its
//! bytes. There is no floating point and no platform-dependent padding, so
//! two semantically equal values always produce the same byte string
//! regardless of map iteration order, allocator behavior, or process
//! architecture — the property §8.4 (envelope canonicalization) depends on.

/// An append-only canonical field writer.
#[derive(Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    /// Start a new canonical encoding.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a length-prefixed byte field.
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append a length-prefixed UTF-8 string field (NFC normalization is the
    /// caller's responsibility at the point the string is constructed).
    pub fn str_field(&mut self, s: &str) -> &mut Self {
        self.field(s.as_bytes())
    }

    /// Append a fixed-width unsigned integer field, little-endian.
    pub fn u64_field(&mut self, v: u64) -> &mut Self {
        self.field(&v.to_le_bytes())
    }

    /// Append a fixed-width signed integer field, little-endian.
    pub fn i64_field(&mut self, v: i64) -> &mut Self {
        self.field(&v.to_le_bytes())
    }

    /// Append a single byte field (booleans, small enums).
    pub fn u8_field(&mut self, v: u8) -> &mut Self {
        self.field(&[v])
    }

    /// Consume the writer, returning the canonical byte string.
    pub fn finish(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_changes_output() {
        let mut a = CanonicalWriter::new();
        a.str_field("x").str_field("y");
        let mut b = CanonicalWriter::new();
        b.str_field("y").str_field("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn identical_fields_produce_identical_bytes() {
        let mut a = CanonicalWriter::new();
        a.str_field("HELLO").u64_field(42).field(b"payload");
        let mut b = CanonicalWriter::new();
        b.str_field("HELLO").u64_field(42).field(b"payload");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn length_prefix_prevents_field_concatenation_ambiguity() {
        // Without length prefixes, ("ab","c") and ("a","bc") would collide.
        let mut a = CanonicalWriter::new();
        a.str_field("ab").str_field("c");
        let mut b = CanonicalWriter::new();
        b.str_field("a").str_field("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn single_bit_flip_in_any_field_changes_output() {
        let mut a = CanonicalWriter::new();
        a.field(b"\x00\x00\x00\x00");
        let mut b = CanonicalWriter::new();
        b.field(b"\x01\x00\x00\x00");
        assert_ne!(a.finish(), b.finish());
    }
}
