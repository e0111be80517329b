// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Literal escaper.

use crate::{charset::Charset, codec::Literal, error::EncodeError};

/// Byte-level escaping as done by `mysql_real_escape_string` for ASCII
/// compatible charsets.
///
/// With `no_backslash_escapes` (sql_mode `NO_BACKSLASH_ESCAPES`) a backslash
/// is an ordinary character and the only way to quote `'` is to double it.
pub fn escape_bytes(raw: &[u8], no_backslash_escapes: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 8 + 2);
    if no_backslash_escapes {
        for &b in raw {
            if b == b'\'' {
                out.push(b'\'');
            }
            out.push(b);
        }
        return out;
    }
    for &b in raw {
        match b {
            0 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            0x1a => out.extend_from_slice(b"\\Z"),
            _ => out.push(b),
        }
    }
    out
}

/// Produces quoted literals for the current session.
///
/// Byte-level escaping is delegated to the native connection, which knows
/// the active charset and sql_mode.
pub struct Escaper<'a> {
    escape: &'a (dyn Fn(&[u8]) -> Vec<u8> + 'a),
    charset: Charset,
    binary_prefix: bool,
    binary_safe: bool,
}

impl<'a> Escaper<'a> {
    pub fn new(escape: &'a (dyn Fn(&[u8]) -> Vec<u8> + 'a), charset: Charset) -> Self {
        Escaper {
            escape,
            charset,
            binary_prefix: true,
            binary_safe: true,
        }
    }

    /// Whether byte strings get the `_binary` introducer (defaults to `true`).
    pub fn with_binary_prefix(mut self, binary_prefix: bool) -> Self {
        self.binary_prefix = binary_prefix;
        self
    }

    /// Whether the statement transport accepts bytes that are not UTF-8
    /// (defaults to `true`). If not, such byte strings become hex literals.
    pub fn with_binary_safe(mut self, binary_safe: bool) -> Self {
        self.binary_safe = binary_safe;
        self
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn escape_string(&self, raw: &[u8]) -> Vec<u8> {
        (self.escape)(raw)
    }

    /// `'<escaped>'`.
    pub fn quote(&self, raw: &[u8]) -> Literal {
        let escaped = self.escape_string(raw);
        let mut out = Vec::with_capacity(escaped.len() + 2);
        out.push(b'\'');
        out.extend_from_slice(&escaped);
        out.push(b'\'');
        Literal::from_escaped(out)
    }

    /// Text, transcoded into the connection charset and quoted.
    pub fn text(&self, text: &str) -> Result<Literal, EncodeError> {
        let bytes = self.charset.encode(text)?;
        Ok(self.quote(&bytes))
    }

    /// Raw bytes, guarded against reinterpretation by multi-byte charsets.
    pub fn bytes(&self, raw: &[u8]) -> Literal {
        if !self.binary_safe && std::str::from_utf8(raw).is_err() {
            return hex_literal(raw);
        }
        if !self.binary_prefix {
            return self.quote(raw);
        }
        let quoted = self.quote(raw);
        let mut out = Vec::with_capacity(quoted.len() + 7);
        out.extend_from_slice(b"_binary");
        out.extend_from_slice(quoted.as_bytes());
        Literal::from_escaped(out)
    }
}

fn hex_literal(raw: &[u8]) -> Literal {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(raw.len() * 2 + 3);
    out.extend_from_slice(b"X'");
    for &b in raw {
        out.push(HEX[(b >> 4) as usize]);
        out.push(HEX[(b & 0x0f) as usize]);
    }
    out.push(b'\'');
    Literal::from_escaped(out)
}
