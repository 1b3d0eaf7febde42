//! Strict parser for the mapping literal carried in each frame.
//!
//! The board prints its readings as a dictionary literal such as
//!
//! ```text
//! {'master': {'Accept': 0, 'Decline': 0, 'Rotary': (1, 0)}, '2': {'P': {0: 512}}}
//! ```
//!
//! Only a small grammar is accepted:
//!
//! ```text
//! value  := map | list | number | bool
//! map    := '{' [ key ':' value ( ',' key ':' value )* [','] ] '}'
//! list   := '[' values ']' | '(' values ')'
//! key    := quoted string | integer
//! number := ['-'|'+'] digits ['.' digits] [('e'|'E') ['-'|'+'] digits]
//! bool   := 'True' | 'False'
//! ```
//!
//! Strings are only valid as keys. Anything outside the grammar is rejected
//! with the byte offset of the offending input.

use alloc::string::String;
use alloc::vec::Vec;

/// Maximum nesting depth accepted (frames nest three levels deep).
pub const MAX_DEPTH: usize = 8;

/// A parsed literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer, float or boolean (`True` = 1, `False` = 0).
    Number(f64),
    /// List or tuple of values.
    List(Vec<Literal>),
    /// Mapping with keys in source order. Later duplicates replace earlier ones.
    Map(Vec<(String, Literal)>),
}

impl Literal {
    /// Look up a key in a map literal.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The numeric value, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// What went wrong while parsing a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LiteralErrorKind {
    /// Input ended in the middle of a value.
    UnexpectedEnd,
    /// A byte that does not fit the grammar at this position.
    UnexpectedByte(u8),
    /// Malformed or out-of-range number.
    InvalidNumber,
    /// Map key is neither a quoted string nor an integer.
    InvalidKey,
    /// Nesting deeper than [`MAX_DEPTH`].
    TooDeep,
    /// Input continues after the top-level value.
    TrailingInput,
}

/// Parse failure with the byte offset where it was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LiteralError {
    pub kind: LiteralErrorKind,
    pub offset: usize,
}

impl core::fmt::Display for LiteralError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            LiteralErrorKind::UnexpectedEnd => write!(f, "unexpected end of literal"),
            LiteralErrorKind::UnexpectedByte(b) => {
                write!(f, "unexpected byte {:#04x} at offset {}", b, self.offset)
            }
            LiteralErrorKind::InvalidNumber => write!(f, "invalid number at offset {}", self.offset),
            LiteralErrorKind::InvalidKey => write!(f, "invalid map key at offset {}", self.offset),
            LiteralErrorKind::TooDeep => write!(f, "nesting too deep at offset {}", self.offset),
            LiteralErrorKind::TrailingInput => {
                write!(f, "trailing input at offset {}", self.offset)
            }
        }
    }
}

/// Parse a complete literal. The whole input must be consumed.
pub fn parse_literal(input: &[u8]) -> Result<Literal, LiteralError> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error(LiteralErrorKind::TrailingInput));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, kind: LiteralErrorKind) -> LiteralError {
        LiteralError {
            kind,
            offset: self.pos,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(LiteralErrorKind::UnexpectedByte(b))),
            None => Err(self.error(LiteralErrorKind::UnexpectedEnd)),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Literal, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error(LiteralErrorKind::TooDeep));
        }
        self.skip_ws();
        match self.peek() {
            None => Err(self.error(LiteralErrorKind::UnexpectedEnd)),
            Some(b'{') => self.map(depth),
            Some(b'[') => self.list(depth, b']'),
            Some(b'(') => self.list(depth, b')'),
            Some(b'T') => self.keyword(b"True", 1.0),
            Some(b'F') => self.keyword(b"False", 0.0),
            Some(b'-' | b'+' | b'0'..=b'9' | b'.') => self.number().map(Literal::Number),
            Some(b) => Err(self.error(LiteralErrorKind::UnexpectedByte(b))),
        }
    }

    fn keyword(&mut self, word: &[u8], value: f64) -> Result<Literal, LiteralError> {
        if self.input[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(Literal::Number(value))
        } else {
            Err(self.error(LiteralErrorKind::UnexpectedByte(self.input[self.pos])))
        }
    }

    fn map(&mut self, depth: usize) -> Result<Literal, LiteralError> {
        self.expect(b'{')?;
        let mut entries: Vec<(String, Literal)> = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Map(entries));
            }
            let key = self.key()?;
            self.expect(b':')?;
            let value = self.value(depth + 1)?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                Some(b) => return Err(self.error(LiteralErrorKind::UnexpectedByte(b))),
                None => return Err(self.error(LiteralErrorKind::UnexpectedEnd)),
            }
        }
    }

    fn list(&mut self, depth: usize, close: u8) -> Result<Literal, LiteralError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Literal::List(items));
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {}
                Some(b) => return Err(self.error(LiteralErrorKind::UnexpectedByte(b))),
                None => return Err(self.error(LiteralErrorKind::UnexpectedEnd)),
            }
        }
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ (b'\'' | b'"')) => {
                let start = self.pos + 1;
                let len = self.input[start..]
                    .iter()
                    .position(|&b| b == quote)
                    .ok_or(LiteralError {
                        kind: LiteralErrorKind::UnexpectedEnd,
                        offset: self.input.len(),
                    })?;
                let raw = &self.input[start..start + len];
                if raw.iter().any(|b| !b.is_ascii() || *b == b'\\' || b.is_ascii_control()) {
                    return Err(self.error(LiteralErrorKind::InvalidKey));
                }
                self.pos = start + len + 1;
                // Checked ASCII above
                Ok(raw.iter().map(|&b| b as char).collect())
            }
            Some(b'0'..=b'9' | b'-') => {
                let start = self.pos;
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                }
                let digits = self.digits();
                if digits == 0 {
                    return Err(LiteralError {
                        kind: LiteralErrorKind::InvalidKey,
                        offset: start,
                    });
                }
                Ok(self.input[start..self.pos].iter().map(|&b| b as char).collect())
            }
            Some(_) => Err(self.error(LiteralErrorKind::InvalidKey)),
            None => Err(self.error(LiteralErrorKind::UnexpectedEnd)),
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<f64, LiteralError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        let mut mantissa: f64 = 0.0;
        let int_start = self.pos;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            mantissa = mantissa * 10.0 + f64::from(d - b'0');
            self.pos += 1;
        }
        let mut int_digits = self.pos - int_start;

        let mut scale: i32 = 0;
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while let Some(d @ b'0'..=b'9') = self.peek() {
                mantissa = mantissa * 10.0 + f64::from(d - b'0');
                scale -= 1;
                int_digits += 1;
                self.pos += 1;
            }
        }
        if int_digits == 0 {
            return Err(LiteralError {
                kind: LiteralErrorKind::InvalidNumber,
                offset: start,
            });
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            let exp_negative = match self.peek() {
                Some(b'-') => {
                    self.pos += 1;
                    true
                }
                Some(b'+') => {
                    self.pos += 1;
                    false
                }
                _ => false,
            };
            let mut exp: i32 = 0;
            let exp_start = self.pos;
            while let Some(d @ b'0'..=b'9') = self.peek() {
                exp = exp
                    .checked_mul(10)
                    .and_then(|e| e.checked_add(i32::from(d - b'0')))
                    .ok_or(LiteralError {
                        kind: LiteralErrorKind::InvalidNumber,
                        offset: start,
                    })?;
                self.pos += 1;
            }
            if self.pos == exp_start {
                return Err(LiteralError {
                    kind: LiteralErrorKind::InvalidNumber,
                    offset: start,
                });
            }
            scale += if exp_negative { -exp } else { exp };
        }

        let value = if scale < 0 {
            mantissa / pow10(scale.unsigned_abs())
        } else {
            mantissa * pow10(scale.unsigned_abs())
        };
        if !value.is_finite() {
            return Err(LiteralError {
                kind: LiteralErrorKind::InvalidNumber,
                offset: start,
            });
        }
        Ok(if negative { -value } else { value })
    }
}

/// `10^exp` without `std` float intrinsics.
fn pow10(exp: u32) -> f64 {
    let mut result = 1.0;
    let mut n = exp;
    let mut base = 10.0f64;
    while n > 0 {
        if n & 1 == 1 {
            result *= base;
        }
        base *= base;
        n >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::vec;

    fn map(entries: &[(&str, Literal)]) -> Literal {
        Literal::Map(
            entries
                .iter()
                .map(|(k, v)| (String::from(*k), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_master_frame() {
        let lit = parse_literal(b"{'master': {'Accept': 0, 'Decline': 1, 'Rotary': (1, 0)}}").unwrap();
        let expected = map(&[(
            "master",
            map(&[
                ("Accept", Literal::Number(0.0)),
                ("Decline", Literal::Number(1.0)),
                (
                    "Rotary",
                    Literal::List(vec![Literal::Number(1.0), Literal::Number(0.0)]),
                ),
            ]),
        )]);
        assert_eq!(lit, expected);
    }

    #[test]
    fn test_parse_double_quotes_and_integer_keys() {
        let lit = parse_literal(br#"{"2": {"P": {0: 512, 1: 3.25}}}"#).unwrap();
        let pots = lit.get("2").and_then(|n| n.get("P")).unwrap();
        assert_eq!(pots.get("0").and_then(Literal::as_number), Some(512.0));
        assert_eq!(pots.get("1").and_then(Literal::as_number), Some(3.25));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_literal(b"-12").unwrap(), Literal::Number(-12.0));
        assert_eq!(parse_literal(b"0.5").unwrap(), Literal::Number(0.5));
        assert_eq!(parse_literal(b".5").unwrap(), Literal::Number(0.5));
        assert_eq!(parse_literal(b"1e3").unwrap(), Literal::Number(1000.0));
        assert_eq!(parse_literal(b"25E-1").unwrap(), Literal::Number(2.5));
        assert_eq!(parse_literal(b"True").unwrap(), Literal::Number(1.0));
        assert_eq!(parse_literal(b"False").unwrap(), Literal::Number(0.0));
    }

    #[test]
    fn test_trailing_comma_and_whitespace() {
        let lit = parse_literal(b"  { 'a' : [1, 2, ], }  ").unwrap();
        assert_eq!(
            lit,
            map(&[(
                "a",
                Literal::List(vec![Literal::Number(1.0), Literal::Number(2.0)])
            )])
        );
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let lit = parse_literal(b"{'a': 1, 'b': 2, 'a': 3}").unwrap();
        assert_eq!(
            lit,
            map(&[("a", Literal::Number(3.0)), ("b", Literal::Number(2.0))])
        );
    }

    #[test]
    fn test_rejects_expressions_and_strings() {
        assert_eq!(
            parse_literal(b"{'a': __import__('os')}").unwrap_err().kind,
            LiteralErrorKind::UnexpectedByte(b'_')
        );
        assert_eq!(
            parse_literal(b"{'a': 'text'}").unwrap_err().kind,
            LiteralErrorKind::UnexpectedByte(b'\'')
        );
        assert_eq!(
            parse_literal(b"{'a': None}").unwrap_err().kind,
            LiteralErrorKind::UnexpectedByte(b'N')
        );
        assert_eq!(
            parse_literal(b"{1.5: 2}").unwrap_err().kind,
            LiteralErrorKind::UnexpectedByte(b'.')
        );
    }

    #[test]
    fn test_rejects_truncated_and_trailing() {
        assert_eq!(
            parse_literal(b"{'a': {'b': 1}").unwrap_err().kind,
            LiteralErrorKind::UnexpectedEnd
        );
        let err = parse_literal(b"{'a': 1}}").unwrap_err();
        assert_eq!(err.kind, LiteralErrorKind::TrailingInput);
        assert_eq!(err.offset, 8);
        assert_eq!(parse_literal(b"").unwrap_err().kind, LiteralErrorKind::UnexpectedEnd);
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert_eq!(parse_literal(b"-").unwrap_err().kind, LiteralErrorKind::InvalidNumber);
        assert_eq!(parse_literal(b"1e").unwrap_err().kind, LiteralErrorKind::InvalidNumber);
        assert_eq!(parse_literal(b"1e999").unwrap_err().kind, LiteralErrorKind::InvalidNumber);
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let deep = b"[[[[[[[[[[1]]]]]]]]]]";
        assert_eq!(parse_literal(deep).unwrap_err().kind, LiteralErrorKind::TooDeep);
    }
}
