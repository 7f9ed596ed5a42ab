use bytes::{Bytes, BytesMut};

use super::error::ParseError;

/// Maximum nesting depth for arrays/maps/sets/pushes/attributes (spec §4.1).
pub const MAX_NESTING_DEPTH: usize = 100;

/// The wire type of a [`Token`], keyed by its RESP3 leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    SimpleString,
    SimpleError,
    Integer,
    BulkString,
    BulkError,
    VerbatimString,
    Double,
    Boolean,
    Null,
    BigNumber,
    Array,
    Set,
    Push,
    Map,
    Attribute,
}

impl TokenKind {
    fn from_leading_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'+' => Self::SimpleString,
            b'-' => Self::SimpleError,
            b':' => Self::Integer,
            b'$' => Self::BulkString,
            b'!' => Self::BulkError,
            b'=' => Self::VerbatimString,
            b',' => Self::Double,
            b'#' => Self::Boolean,
            b'_' => Self::Null,
            b'(' => Self::BigNumber,
            b'*' => Self::Array,
            b'~' => Self::Set,
            b'>' => Self::Push,
            b'%' => Self::Map,
            b'|' => Self::Attribute,
            _ => return None,
        })
    }

    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Self::Array | Self::Set | Self::Push | Self::Map | Self::Attribute
        )
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::SimpleString => "simpleString",
            Self::SimpleError => "simpleError",
            Self::Integer => "integer",
            Self::BulkString => "bulkString",
            Self::BulkError => "bulkError",
            Self::VerbatimString => "verbatimString",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::BigNumber => "bigNumber",
            Self::Array => "array",
            Self::Set => "set",
            Self::Push => "push",
            Self::Map => "map",
            Self::Attribute => "attribute",
        }
    }
}

/// An owned, immutable byte slice that frames exactly one complete RESP3
/// value, optionally preceded by an attribute token (spec §9, Open
/// Questions: attributes are attached to the following value, not surfaced
/// as a separate FIFO entry).
#[derive(Debug, Clone)]
pub struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) bytes: Bytes,
    pub(crate) attribute: Option<Box<Token>>,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The raw wire bytes, exactly framing this token (and nothing else).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// An attribute (`|`) that preceded this value on the wire, if any.
    pub fn attribute(&self) -> Option<&Token> {
        self.attribute.as_deref()
    }
}

/// Attempts to frame one complete token from the front of `buf`.
///
/// On success, the consumed bytes are removed from `buf` and returned as an
/// owned [`Token`]. Returns `Ok(None)` if `buf` does not yet contain a
/// complete token ("need more bytes"). Never panics on malformed input;
/// instead returns `Err` at the offset where the malformation was found.
pub fn parse(buf: &mut BytesMut) -> Result<Option<Token>, ParseError> {
    let Some((kind, end, attr_len)) = scan_top_level(buf)? else {
        return Ok(None);
    };
    let mut whole = buf.split_to(end).freeze();
    let attribute = if attr_len > 0 {
        let attr_bytes = whole.split_to(attr_len);
        let (attr_kind, _) = scan_token(&attr_bytes, 0, 0)?
            .expect("attribute prefix was already fully scanned");
        Some(Box::new(Token {
            kind: attr_kind,
            bytes: attr_bytes,
            attribute: None,
        }))
    } else {
        None
    };
    Ok(Some(Token {
        kind,
        bytes: whole,
        attribute,
    }))
}

/// Parses every complete token currently available in `buf`, invoking `sink`
/// for each one in order, and leaves the trailing partial bytes (if any) in
/// `buf`. Total: either consumes a finite prefix of complete tokens, or
/// returns the parse error encountered at the first malformed token.
pub fn parse_all(
    buf: &mut BytesMut,
    mut sink: impl FnMut(Token),
) -> Result<(), ParseError> {
    while let Some(token) = parse(buf)? {
        sink(token);
    }
    Ok(())
}

/// Scans a top-level token, folding in a leading attribute (if present) so
/// that the caller gets one `Token` with the attribute attached rather than
/// two FIFO entries. Returns `(kind_of_value, end_of_whole_frame, attribute_len)`.
fn scan_top_level(buf: &[u8]) -> Result<Option<(TokenKind, usize, usize)>, ParseError> {
    let Some((first_kind, first_end)) = scan_token(buf, 0, 0)? else {
        return Ok(None);
    };
    if first_kind != TokenKind::Attribute {
        return Ok(Some((first_kind, first_end, 0)));
    }
    // An attribute token must be followed by the value it annotates.
    match scan_token(buf, first_end, 0)? {
        Some((value_kind, value_end)) => Ok(Some((value_kind, value_end, first_end))),
        None => Ok(None),
    }
}

/// Scans the token starting at `pos`, returning `(kind, end)` on success,
/// `None` if more bytes are needed, or a [`ParseError`] on malformed input.
fn scan_token(
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<Option<(TokenKind, usize)>, ParseError> {
    let Some(&lead) = buf.get(pos) else {
        return Ok(None);
    };
    let kind = TokenKind::from_leading_byte(lead).ok_or(ParseError::InvalidLeadingByte {
        byte: lead,
        offset: pos,
    })?;

    match kind {
        TokenKind::SimpleString | TokenKind::SimpleError | TokenKind::Integer => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            if kind == TokenKind::Integer {
                let content = &buf[pos + 1..crlf];
                parse_i64(content, pos + 1)?;
            }
            Ok(Some((kind, crlf + 2)))
        }
        TokenKind::Double => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            let content = &buf[pos + 1..crlf];
            parse_f64(content, pos + 1)?;
            Ok(Some((kind, crlf + 2)))
        }
        TokenKind::BigNumber => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            let content = &buf[pos + 1..crlf];
            validate_big_number(content, pos + 1)?;
            Ok(Some((kind, crlf + 2)))
        }
        TokenKind::Boolean => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            let content = &buf[pos + 1..crlf];
            if content.len() != 1 || (content[0] != b't' && content[0] != b'f') {
                return Err(ParseError::InvalidData {
                    offset: pos + 1,
                    reason: "boolean payload must be exactly 't' or 'f'",
                });
            }
            Ok(Some((kind, crlf + 2)))
        }
        TokenKind::Null => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            if crlf != pos + 1 {
                return Err(ParseError::InvalidData {
                    offset: pos + 1,
                    reason: "null must not carry a payload",
                });
            }
            Ok(Some((kind, crlf + 2)))
        }
        TokenKind::BulkString | TokenKind::BulkError | TokenKind::VerbatimString => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            let len = parse_i64(&buf[pos + 1..crlf], pos + 1)?;
            if len == -1 {
                if kind == TokenKind::BulkString {
                    return Ok(Some((kind, crlf + 2)));
                }
                return Err(ParseError::InvalidElementCount {
                    count: len,
                    offset: pos + 1,
                });
            }
            if len < -1 {
                return Err(ParseError::InvalidElementCount {
                    count: len,
                    offset: pos + 1,
                });
            }
            let len = len as usize;
            let payload_start = crlf + 2;
            let payload_end = payload_start + len;
            if buf.len() < payload_end + 2 {
                return Ok(None);
            }
            if kind == TokenKind::VerbatimString {
                if len < 4 {
                    return Err(ParseError::MissingColonInVerbatimString {
                        offset: payload_start,
                    });
                }
                if buf[payload_start + 3] != b':' {
                    return Err(ParseError::MissingColonInVerbatimString {
                        offset: payload_start + 3,
                    });
                }
            }
            if &buf[payload_end..payload_end + 2] != b"\r\n" {
                return Err(ParseError::InvalidData {
                    offset: payload_end,
                    reason: "missing CRLF after bulk payload",
                });
            }
            Ok(Some((kind, payload_end + 2)))
        }
        TokenKind::Array | TokenKind::Set | TokenKind::Push | TokenKind::Map | TokenKind::Attribute => {
            let Some(crlf) = find_crlf(buf, pos + 1) else {
                return Ok(None);
            };
            let count = parse_i64(&buf[pos + 1..crlf], pos + 1)?;
            if count == -1 && kind == TokenKind::Array {
                return Ok(Some((kind, crlf + 2)));
            }
            if count < 0 {
                return Err(ParseError::InvalidElementCount {
                    count,
                    offset: pos + 1,
                });
            }
            if depth + 1 > MAX_NESTING_DEPTH {
                return Err(ParseError::TooDeeplyNestedAggregates {
                    max: MAX_NESTING_DEPTH,
                    offset: pos,
                });
            }
            let multiplier = if matches!(kind, TokenKind::Map | TokenKind::Attribute) {
                2
            } else {
                1
            };
            let element_count = (count as usize).saturating_mul(multiplier);
            let mut cursor = crlf + 2;
            for _ in 0..element_count {
                match scan_token(buf, cursor, depth + 1)? {
                    Some((_, end)) => cursor = end,
                    None => return Ok(None),
                }
            }
            Ok(Some((kind, cursor)))
        }
    }
}

fn find_crlf(buf: &[u8], start: usize) -> Option<usize> {
    if start > buf.len() {
        return None;
    }
    let haystack = &buf[start..];
    let mut i = 0;
    while i + 1 < haystack.len() {
        if haystack[i] == b'\r' && haystack[i + 1] == b'\n' {
            return Some(start + i);
        }
        i += 1;
    }
    None
}

fn parse_i64(content: &[u8], offset: usize) -> Result<i64, ParseError> {
    std::str::from_utf8(content)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::CanNotParseInteger {
            bytes: content.to_vec(),
            offset,
        })
}

fn parse_f64(content: &[u8], offset: usize) -> Result<f64, ParseError> {
    std::str::from_utf8(content)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| ParseError::CanNotParseDouble {
            bytes: content.to_vec(),
            offset,
        })
}

fn validate_big_number(content: &[u8], offset: usize) -> Result<(), ParseError> {
    let digits = content.strip_prefix(b"-").unwrap_or(content);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::CanNotParseBigNumber {
            bytes: content.to_vec(),
            offset,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(s: &[u8]) -> BytesMut {
        BytesMut::from(s)
    }

    #[test]
    fn parses_bulk_string() {
        let mut b = buf(b"$5\r\nhello\r\n");
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::BulkString);
        assert_eq!(token.as_bytes(), b"$5\r\nhello\r\n");
        assert!(b.is_empty());
    }

    #[test]
    fn parses_null_array() {
        let mut b = buf(b"*-1\r\n");
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::Array);
        assert_eq!(token.as_bytes(), b"*-1\r\n");
    }

    #[test]
    fn parses_nested_aggregate() {
        let input = b"*2\r\n:1\r\n*2\r\n+ok\r\n$3\r\nfoo\r\n";
        let mut b = buf(input);
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::Array);
        assert_eq!(token.as_bytes(), &input[..]);
        assert!(b.is_empty());
    }

    #[test]
    fn need_more_bytes_is_not_an_error() {
        let mut b = buf(b"$5\r\nhel");
        assert!(parse(&mut b).unwrap().is_none());
        assert_eq!(b.as_ref(), b"$5\r\nhel");
    }

    #[test]
    fn rejects_invalid_leading_byte() {
        let mut b = buf(b"@foo\r\n");
        let err = parse(&mut b).unwrap_err();
        assert!(matches!(err, ParseError::InvalidLeadingByte { byte: b'@', offset: 0 }));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        let mut b = buf(&input);
        let err = parse(&mut b).unwrap_err();
        assert!(matches!(err, ParseError::TooDeeplyNestedAggregates { .. }));
    }

    #[test]
    fn verbatim_string_requires_colon() {
        let mut b = buf(b"=9\r\ntxtnocolon\r\n");
        // length 9 but "txtnocolo" has no ':' at index 3 -> error
        let err = parse(&mut b).unwrap_err();
        assert!(matches!(err, ParseError::MissingColonInVerbatimString { .. }));
    }

    #[test]
    fn verbatim_string_ok() {
        let mut b = buf(b"=9\r\ntxt:hello\r\n");
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::VerbatimString);
    }

    #[test]
    fn attribute_attaches_to_following_value_not_fifo() {
        let mut b = buf(b"|1\r\n+key\r\n+val\r\n:42\r\n");
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::Integer);
        assert!(token.attribute().is_some());
        assert!(b.is_empty());
    }

    #[test]
    fn big_number_accepts_sign() {
        let mut b = buf(b"(-123456789012345678901234\r\n");
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.kind(), TokenKind::BigNumber);
    }

    #[test]
    fn slice_recovers_frame_exactly() {
        let input = b"*3\r\n:1\r\n:2\r\n:3\r\n";
        let mut b = buf(input);
        let token = parse(&mut b).unwrap().unwrap();
        assert_eq!(token.as_bytes().len(), input.len());
    }
}
