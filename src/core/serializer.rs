//! Canonical PDF byte production for tokens, object records, and the
//! classic cross-reference table.

use std::io::{self, Write};

use crate::core::token::{Dictionary, Numeric, PdfString, Reference, Token};
use crate::error::MergeError;

/// The binary-marker comment bytes written on the line after the header,
/// signalling to naive readers that the file contains binary data.
const BINARY_MARKER: [u8; 4] = [0x93, 0x8C, 0x8B, 0x9E];

/// Output PDF version, a `(major, minor)` pair. Always rendered as a single
/// decimal digit on each side (`%PDF-1.7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub u8, pub u8);

impl Default for Version {
    fn default() -> Self {
        Version(1, 2)
    }
}

/// Serializes tokens to canonical PDF syntax using a reusable scratch
/// buffer, so repeated `write_token` calls in `DedupWriter` don't
/// reallocate.
#[derive(Default)]
pub struct TokenSerializer {
    buf: Vec<u8>,
}

impl TokenSerializer {
    pub fn new() -> Self {
        TokenSerializer { buf: Vec::new() }
    }

    /// Serialize `token` into the scratch buffer and return a snapshot of
    /// the resulting bytes. The buffer is cleared (not reallocated) on
    /// entry, so the caller may mutate it freely afterwards.
    pub fn serialize(&mut self, token: &Token) -> Vec<u8> {
        self.buf.clear();
        encode(token, &mut self.buf);
        self.buf.clone()
    }

    /// Emit `%PDF-V.V\n` followed by the binary-marker comment line.
    pub fn write_header<W: Write>(&self, w: &mut W, version: Version) -> io::Result<u64> {
        let header = format!("%PDF-{}.{}\n", version.0, version.1);
        w.write_all(header.as_bytes())?;
        w.write_all(b"%")?;
        w.write_all(&BINARY_MARKER)?;
        w.write_all(b"\n")?;
        Ok((header.len() + 1 + BINARY_MARKER.len() + 1) as u64)
    }

    /// Emit `N G obj\n<body>\nendobj\n` for an already-serialized body.
    pub fn write_object_record<W: Write>(
        &self,
        w: &mut W,
        reference: Reference,
        body: &[u8],
    ) -> io::Result<u64> {
        let header = format!("{} {} obj\n", reference.number, reference.generation);
        w.write_all(header.as_bytes())?;
        w.write_all(body)?;
        w.write_all(b"\nendobj\n")?;
        Ok((header.len() + body.len() + 8) as u64)
    }

    /// Emit the classic single-subsection xref table, trailer, and the
    /// `startxref`/`%%EOF` footer.
    ///
    /// `offsets` must be sorted ascending by object number and must form a
    /// contiguous range starting at some `min >= 1`; otherwise this fails
    /// with `MergeError::FragmentedObjectRange`.
    pub fn write_xref_and_trailer<W: Write + io::Seek>(
        &self,
        w: &mut W,
        offsets: &[(Reference, u64)],
        catalog: Reference,
        info: Option<Reference>,
    ) -> Result<(), MergeError> {
        if offsets.is_empty() {
            return Err(MergeError::FragmentedObjectRange { min: 0, max: 0, count: 0 });
        }
        let min = offsets.first().unwrap().0.number;
        let max = offsets.last().unwrap().0.number;
        let count = offsets.len() as u32;
        if min != 1 || max - min + 1 != count {
            return Err(MergeError::FragmentedObjectRange { min, max, count });
        }

        w.write_all(b"\n")?;
        let xref_pos = w.stream_position()?;
        w.write_all(b"xref\n")?;
        writeln!(w, "0 {}", count + 1)?;
        write!(w, "0000000000 65535 f \n")?;
        for (reference, offset) in offsets {
            write!(w, "{:010} {:05} n \n", offset, reference.generation)?;
        }

        w.write_all(b"trailer\n")?;
        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Token::integer((count + 1) as i64));
        trailer.insert("Root".to_string(), Token::reference(catalog));
        trailer.insert("Id".to_string(), Token::Array(vec![random_id_token(), random_id_token()]));
        if let Some(info) = info {
            trailer.insert("Info".to_string(), Token::reference(info));
        }
        let trailer_bytes = encode_owned(&Token::Dictionary(trailer));
        w.write_all(&trailer_bytes)?;
        w.write_all(b"\n")?;

        writeln!(w, "startxref")?;
        writeln!(w, "{}", xref_pos)?;
        w.write_all(b"%%EOF")?;

        Ok(())
    }
}

fn random_id_token() -> Token {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    Token::Hex(bytes.to_vec())
}

fn encode_owned(token: &Token) -> Vec<u8> {
    let mut buf = Vec::new();
    encode(token, &mut buf);
    buf
}

fn encode(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Null => out.extend_from_slice(b"null "),
        Token::Boolean(b) => out.extend_from_slice(if *b { b"true " } else { b"false " }),
        Token::Numeric(Numeric::Integer(i)) => {
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b' ');
        }
        Token::Numeric(Numeric::Real(r)) => {
            out.extend_from_slice(format_real(*r).as_bytes());
            out.push(b' ');
        }
        Token::Name(name) => {
            out.push(b'/');
            encode_name(name, out);
            out.push(b' ');
        }
        Token::String(s) => encode_string(s, out),
        Token::Hex(bytes) => {
            out.push(b'<');
            for b in bytes {
                out.extend_from_slice(format!("{:02X}", b).as_bytes());
            }
            out.push(b'>');
        }
        Token::Array(items) => {
            out.push(b'[');
            for item in items {
                encode(item, out);
            }
            out.push(b']');
        }
        Token::Dictionary(dict) => encode_dictionary(dict, out),
        Token::Stream(dict, payload) => {
            encode_dictionary(dict, out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(payload);
            out.extend_from_slice(b"\nendstream");
        }
        Token::Comment(text) => {
            out.push(b'%');
            out.extend_from_slice(text.as_bytes());
            out.push(b'\n');
        }
        Token::IndirectReference(r) => {
            out.extend_from_slice(format!("{} {} R ", r.number, r.generation).as_bytes());
        }
        Token::Object { reference, value } => {
            out.extend_from_slice(format!("{} {} obj\n", reference.number, reference.generation).as_bytes());
            encode(value, out);
            out.extend_from_slice(b"\nendobj\n");
        }
    }
}

fn encode_dictionary(dict: &Dictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        out.push(b'/');
        encode_name(key, out);
        out.push(b' ');
        encode(value, out);
    }
    out.extend_from_slice(b">>");
}

/// Characters outside `0x21..=0x7E`, or in the PDF delimiter set, are
/// escaped as `#HH` (uppercase hex).
fn encode_name(name: &str, out: &mut Vec<u8>) {
    const DELIMITERS: &[u8] = b"()<>[]{}/%";
    for &b in name.as_bytes() {
        if b < 0x21 || b > 0x7E || DELIMITERS.contains(&b) {
            out.extend_from_slice(format!("#{:02X}", b).as_bytes());
        } else {
            out.push(b);
        }
    }
}

/// Latin-1-or-UTF-16BE heuristic: if every code unit is <= 250, emit a
/// Latin-1 literal string with backslash-escaped `(`, `)`, `\`. Otherwise
/// re-encode as UTF-16BE with a `FE FF` BOM, skipping the escape scan
/// (UTF-16BE bytes are written verbatim between parentheses).
fn encode_string(s: &PdfString, out: &mut Vec<u8>) {
    if s.0.iter().all(|&unit| unit <= 250) {
        out.push(b'(');
        for &unit in &s.0 {
            let byte = unit as u8;
            if byte == b'(' || byte == b')' || byte == b'\\' {
                out.push(b'\\');
            }
            out.push(byte);
        }
        out.push(b')');
    } else {
        out.push(b'(');
        out.extend_from_slice(&[0xFE, 0xFF]);
        for &unit in &s.0 {
            out.extend_from_slice(&unit.to_be_bytes());
        }
        out.push(b')');
    }
}

/// Invariant-culture `G`-style formatting: a plain decimal point, no
/// grouping, trailing zeros trimmed.
fn format_real(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut s = format!("{:.6}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_delimiter_characters_in_names() {
        let mut buf = Vec::new();
        encode_name("A#B(C)", &mut buf);
        assert_eq!(String::from_utf8(buf).unwrap(), "A#23B#28C#29");
    }

    #[test]
    fn latin1_strings_escape_parens_and_backslash() {
        let mut out = Vec::new();
        encode_string(&PdfString::from_latin1(b"(a)\\b"), &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), r"(\(a\)\\b)");
    }

    #[test]
    fn wide_code_units_force_utf16be() {
        let mut out = Vec::new();
        let wide = PdfString(vec![0x0100, 0x0041]);
        encode_string(&wide, &mut out);
        assert_eq!(out[0], b'(');
        assert_eq!(&out[1..3], &[0xFE, 0xFF]);
        assert_eq!(&out[3..5], &[0x01, 0x00]);
        assert_eq!(&out[5..7], &[0x00, 0x41]);
        assert_eq!(out[7], b')');
    }

    #[test]
    fn integers_have_no_decimal_point() {
        let mut ser = TokenSerializer::new();
        let bytes = ser.serialize(&Token::integer(42));
        assert_eq!(bytes, b"42 ");
    }

    #[test]
    fn reals_trim_trailing_zeros() {
        let mut ser = TokenSerializer::new();
        let bytes = ser.serialize(&Token::real(1.5));
        assert_eq!(bytes, b"1.5 ");
    }

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Token::name("Font"));
        dict.insert("Subtype".to_string(), Token::name("Type1"));
        let mut ser = TokenSerializer::new();
        let bytes = ser.serialize(&Token::Dictionary(dict));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "<</Type /Font /Subtype /Type1 >>"
        );
    }

    #[test]
    fn xref_rejects_fragmented_object_numbers() {
        let ser = TokenSerializer::new();
        let mut out = std::io::Cursor::new(Vec::new());
        let offsets = vec![(Reference::fresh(1), 10u64), (Reference::fresh(3), 20u64)];
        let err = ser
            .write_xref_and_trailer(&mut out, &offsets, Reference::fresh(1), None)
            .unwrap_err();
        assert!(matches!(err, MergeError::FragmentedObjectRange { .. }));
    }
}
