//! Byte-level readers for raw containers and simulator text output
//!
//! LTspice writes its `.raw` headers and `.log` files as UTF-16LE, while
//! ngspice and most other tools write plain ASCII. Both are handled here so
//! the parser and the run orchestrator share one decoding path.

use byteorder::{ByteOrder, LittleEndian};
use num_complex::Complex64;

const UTF16_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Text encoding detected from the leading bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
}

impl TextEncoding {
    /// Detect the encoding from a BOM, or from a NUL high byte in the first
    /// character (ASCII text encoded as UTF-16LE).
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&UTF16_BOM) {
            TextEncoding::Utf16Le
        } else if bytes.len() >= 2 && bytes[0] != 0 && bytes[1] == 0 {
            TextEncoding::Utf16Le
        } else {
            TextEncoding::Utf8
        }
    }

    /// Length of the byte-order mark at the start of `bytes`, if any
    fn bom_len(self, bytes: &[u8]) -> usize {
        match self {
            TextEncoding::Utf16Le if bytes.starts_with(&UTF16_BOM) => UTF16_BOM.len(),
            TextEncoding::Utf8 if bytes.starts_with(&UTF8_BOM) => UTF8_BOM.len(),
            _ => 0,
        }
    }
}

/// Decode a whole text file leniently, replacing invalid sequences.
pub fn decode_text(bytes: &[u8]) -> String {
    let encoding = TextEncoding::detect(bytes);
    decode_as(&bytes[encoding.bom_len(bytes)..], encoding)
}

/// Decode text whose encoding is already known (e.g. a section of a file
/// whose header was sniffed).
pub fn decode_as(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Utf16Le => decode_utf16_lossy(bytes),
    }
}

#[inline]
fn decode_utf16_lossy(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(LittleEndian::read_u16);
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Line iterator over a container header.
///
/// Yields each line (without terminator) together with the byte offset just
/// past its newline, so the caller can locate the data section that follows
/// the `Binary:` or `Values:` marker.
pub struct HeaderLines<'a> {
    data: &'a [u8],
    pos: usize,
    encoding: TextEncoding,
}

impl<'a> HeaderLines<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let encoding = TextEncoding::detect(data);
        Self {
            data,
            pos: encoding.bom_len(data),
            encoding,
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn next_utf8(&mut self) -> (String, usize) {
        let rest = &self.data[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        let text = String::from_utf8_lossy(line);
        (text.trim_end_matches('\r').to_string(), self.pos)
    }

    fn next_utf16(&mut self) -> (String, usize) {
        let rest = &self.data[self.pos..];
        let end = rest
            .chunks_exact(2)
            .position(|unit| unit == [b'\n', 0]);
        let (line, consumed) = match end {
            Some(units) => (&rest[..units * 2], units * 2 + 2),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        let text = decode_utf16_lossy(line);
        (text.trim_end_matches('\r').to_string(), self.pos)
    }
}

impl<'a> Iterator for HeaderLines<'a> {
    type Item = (String, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        Some(match self.encoding {
            TextEncoding::Utf8 => self.next_utf8(),
            TextEncoding::Utf16Le => self.next_utf16(),
        })
    }
}

/// Sequential little-endian reader over a binary data section
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Read `count` bytes, or `None` if fewer remain.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        if count > self.remaining() {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Some(bytes)
    }

    #[inline]
    pub fn read_f64(&mut self) -> Option<f64> {
        self.read_bytes(8).map(LittleEndian::read_f64)
    }

    /// Read a float32 sample, widened to f64
    #[inline]
    pub fn read_f32(&mut self) -> Option<f64> {
        self.read_bytes(4).map(|b| LittleEndian::read_f32(b) as f64)
    }

    /// Read an (re, im) pair of f64 values
    #[inline]
    pub fn read_complex(&mut self) -> Option<Complex64> {
        let bytes = self.read_bytes(16)?;
        Some(Complex64::new(
            LittleEndian::read_f64(&bytes[..8]),
            LittleEndian::read_f64(&bytes[8..]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_detect_encoding() {
        assert_eq!(TextEncoding::detect(b"Title: x"), TextEncoding::Utf8);
        assert_eq!(TextEncoding::detect(&utf16("Title: x")), TextEncoding::Utf16Le);
        assert_eq!(TextEncoding::detect(&[0xFF, 0xFE, 0x41, 0x00]), TextEncoding::Utf16Le);
        assert_eq!(TextEncoding::detect(&[]), TextEncoding::Utf8);
    }

    #[test]
    fn test_decode_text_utf16_with_bom() {
        let mut bytes = UTF16_BOM.to_vec();
        bytes.extend(utf16("Circuit: * test\r\nError: unknown\r\n"));
        assert_eq!(decode_text(&bytes), "Circuit: * test\r\nError: unknown\r\n");
    }

    #[test]
    fn test_header_lines_report_data_offset() {
        let mut bytes = utf16("Title: x\nBinary:\n");
        let data_start = bytes.len();
        bytes.extend_from_slice(&1.5f64.to_le_bytes());

        let lines: Vec<_> = HeaderLines::new(&bytes).take(2).collect();
        assert_eq!(lines[0].0, "Title: x");
        assert_eq!(lines[1], ("Binary:".to_string(), data_start));
    }

    #[test]
    fn test_header_lines_strip_carriage_return() {
        let bytes = b"Title: x\r\nValues:\r\n0\t1.0\r\n";
        let mut lines = HeaderLines::new(bytes);
        assert_eq!(lines.next().map(|l| l.0), Some("Title: x".to_string()));
        assert_eq!(lines.next().map(|l| l.0), Some("Values:".to_string()));
    }

    #[test]
    fn test_slice_reader_stops_at_end() {
        let mut bytes = 2.0f64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.push(0xAA);

        let mut reader = SliceReader::new(&bytes);
        assert_eq!(reader.read_f64(), Some(2.0));
        assert_eq!(reader.read_f32(), Some(0.5));
        assert_eq!(reader.read_f32(), None);
        assert_eq!(reader.remaining(), 1);
    }
}
