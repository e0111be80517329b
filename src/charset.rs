// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Connection character sets known to the codec layer.

use std::{borrow::Cow, fmt};

use crate::error::EncodeError;

/// Character set used to transcode text to and from the wire.
///
/// All supported charsets are ASCII compatible, so statement syntax (quotes,
/// `%`, parentheses) is byte-identical across them.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Charset {
    /// `utf8`, `utf8mb3` and `utf8mb4`.
    Utf8,
    /// `latin1` (decoded as ISO-8859-1).
    Latin1,
    Ascii,
    /// `binary`: text is passed through as UTF-8 bytes and decoded lossily.
    Binary,
}

impl Charset {
    /// Resolves a server charset name, `None` if it is not supported.
    pub fn from_name(name: &str) -> Option<Charset> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf8mb3" | "utf8mb4" => Some(Charset::Utf8),
            "latin1" => Some(Charset::Latin1),
            "ascii" => Some(Charset::Ascii),
            "binary" => Some(Charset::Binary),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf8",
            Charset::Latin1 => "latin1",
            Charset::Ascii => "ascii",
            Charset::Binary => "binary",
        }
    }

    pub fn encode<'a>(self, text: &'a str) -> Result<Cow<'a, [u8]>, EncodeError> {
        match self {
            Charset::Utf8 | Charset::Binary => Ok(Cow::Borrowed(text.as_bytes())),
            Charset::Ascii | Charset::Latin1 if text.is_ascii() => {
                Ok(Cow::Borrowed(text.as_bytes()))
            }
            Charset::Ascii | Charset::Latin1 => {
                let limit = if self == Charset::Ascii { 0x7f } else { 0xff };
                let mut out = Vec::with_capacity(text.len());
                for ch in text.chars() {
                    let code = ch as u32;
                    if code > limit {
                        return Err(EncodeError::Charset {
                            charset: self.name().into(),
                            ch,
                        });
                    }
                    out.push(code as u8);
                }
                Ok(Cow::Owned(out))
            }
        }
    }

    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Charset::Utf8 | Charset::Binary | Charset::Ascii => String::from_utf8_lossy(bytes),
            Charset::Latin1 => match std::str::from_utf8(bytes) {
                Ok(text) if text.is_ascii() => Cow::Borrowed(text),
                _ => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
            },
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
