// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Parameter binder for `%s` / `%(name)s` templates.

use std::collections::HashMap;

use crate::{
    codec::{EncodeContext, Literal},
    error::BindError,
    value::Params,
};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum Piece<'a> {
    Text(&'a [u8]),
    /// `%%`
    Percent,
    /// `%s`
    Positional,
    /// `%(name)s`
    Named(&'a str),
}

/// Parsed statement template.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Template<'a> {
    pieces: Vec<Piece<'a>>,
}

/// Encoded parameter values, ready for substitution.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Literals {
    Positional(Vec<Literal>),
    Named(HashMap<String, Literal>),
}

impl Literals {
    /// Encodes `params`. `None` for `Params::Empty`.
    pub fn encode(params: &Params, ctx: &EncodeContext<'_>) -> Result<Option<Literals>, BindError> {
        let literals = match *params {
            Params::Empty => return Ok(None),
            Params::Positional(ref values) => Literals::Positional(ctx.encode_sequence(values)?),
            Params::Named(ref values) => Literals::Named(ctx.encode_mapping(values)?),
        };
        Ok(Some(literals))
    }

    fn supplied(&self) -> usize {
        match *self {
            Literals::Positional(ref values) => values.len(),
            Literals::Named(ref values) => values.len(),
        }
    }
}

impl<'a> Template<'a> {
    pub fn parse(template: &'a [u8]) -> Result<Template<'a>, BindError> {
        let mut pieces = Vec::new();
        let mut text_start = 0;
        let mut i = 0;
        while i < template.len() {
            if template[i] != b'%' {
                i += 1;
                continue;
            }
            if text_start < i {
                pieces.push(Piece::Text(&template[text_start..i]));
            }
            let (piece, len) = match template.get(i + 1) {
                Some(b'%') => (Piece::Percent, 2),
                Some(b's') => (Piece::Positional, 2),
                Some(b'(') => {
                    let close = template[i + 2..]
                        .iter()
                        .position(|&b| b == b')')
                        .map(|pos| i + 2 + pos)
                        .ok_or(BindError::BadPlaceholder(i))?;
                    if template.get(close + 1) != Some(&b's') {
                        return Err(BindError::BadPlaceholder(i));
                    }
                    let name = std::str::from_utf8(&template[i + 2..close])
                        .map_err(|_| BindError::BadPlaceholder(i))?;
                    (Piece::Named(name), close + 2 - i)
                }
                _ => return Err(BindError::BadPlaceholder(i)),
            };
            pieces.push(piece);
            i += len;
            text_start = i;
        }
        if text_start < template.len() {
            pieces.push(Piece::Text(&template[text_start..]));
        }
        Ok(Template { pieces })
    }

    /// Whether anything besides text and `%%` occurs.
    pub fn has_placeholders(&self) -> bool {
        self.pieces
            .iter()
            .any(|piece| matches!(piece, Piece::Positional | Piece::Named(_)))
    }

    fn count_positional(&self) -> usize {
        self.pieces
            .iter()
            .filter(|piece| matches!(piece, Piece::Positional))
            .count()
    }

    /// Template text with `%%` collapsed. Fails if a placeholder occurs.
    pub fn render_text(&self) -> Result<Vec<u8>, BindError> {
        if self.has_placeholders() {
            return Err(BindError::ArityMismatch {
                placeholders: self.count_positional().max(1),
                supplied: 0,
            });
        }
        self.render(&Literals::Positional(Vec::new()))
    }

    /// Substitutes `literals` into the template in a single pass.
    pub fn render(&self, literals: &Literals) -> Result<Vec<u8>, BindError> {
        let wrong_kind = self.pieces.iter().any(|piece| {
            matches!(
                (piece, literals),
                (Piece::Positional, Literals::Named(_)) | (Piece::Named(_), Literals::Positional(_))
            )
        });
        if wrong_kind {
            return Err(BindError::WrongParamsKind);
        }
        if let Literals::Positional(ref values) = *literals {
            let placeholders = self.count_positional();
            if placeholders != values.len() {
                return Err(BindError::ArityMismatch {
                    placeholders,
                    supplied: literals.supplied(),
                });
            }
        }

        let mut out = Vec::new();
        let mut next = 0;
        for piece in &self.pieces {
            match (*piece, literals) {
                (Piece::Text(text), _) => out.extend_from_slice(text),
                (Piece::Percent, _) => out.push(b'%'),
                (Piece::Positional, Literals::Positional(values)) => {
                    out.extend_from_slice(values[next].as_bytes());
                    next += 1;
                }
                (Piece::Named(name), Literals::Named(values)) => match values.get(name) {
                    Some(literal) => out.extend_from_slice(literal.as_bytes()),
                    None => return Err(BindError::MissingNamedParameter(name.into())),
                },
                _ => return Err(BindError::WrongParamsKind),
            }
        }
        Ok(out)
    }
}

/// Binds `params` into `template`.
///
/// `Params::Empty` leaves the template untouched, `%%` included.
pub fn bind(
    template: &[u8],
    params: &Params,
    ctx: &EncodeContext<'_>,
) -> Result<Vec<u8>, BindError> {
    let literals = match Literals::encode(params, ctx)? {
        Some(literals) => literals,
        None => return Ok(template.to_vec()),
    };
    Template::parse(template)?.render(&literals)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::{bind, Template};
    use crate::{
        charset::Charset,
        codec::{Codecs, EncodeContext},
        error::{BindError, EncodeError},
        escape::{escape_bytes, Escaper},
        params,
        value::{Params, Value},
    };

    fn run(template: &str, params: Params) -> Result<String, BindError> {
        let table = Codecs::default().encoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);
        let ctx = EncodeContext::new(&table, &escaper);
        bind(template.as_bytes(), &params, &ctx).map(|out| String::from_utf8(out).unwrap())
    }

    #[test]
    fn should_bind_positional_params() {
        assert_eq!(
            run("INSERT INTO t (a, b) VALUES (%s, %s)", Params::from((5, "x"))).unwrap(),
            "INSERT INTO t (a, b) VALUES (5, 'x')"
        );
        assert_eq!(run("SELECT %s", Params::from((None::<i32>,))).unwrap(), "SELECT NULL");
        assert_eq!(
            run("SELECT '100%%', %s", Params::from(("%s",))).unwrap(),
            "SELECT '100%', '%s'"
        );
    }

    #[test]
    fn should_bind_named_params() {
        let params = params! { "a" => 1, "b" => "it's" };
        assert_eq!(
            run("SELECT %(a)s, %(b)s, %(a)s", params).unwrap(),
            "SELECT 1, 'it\\'s', 1"
        );
        let mut extra = HashMap::new();
        extra.insert("a".to_string(), Value::Int(1));
        extra.insert("unused".to_string(), Value::Int(2));
        assert_eq!(run("SELECT %(a)s", Params::Named(extra)).unwrap(), "SELECT 1");
    }

    #[test]
    fn should_leave_template_untouched_without_params() {
        assert_eq!(run("SELECT '%%' %s", Params::Empty).unwrap(), "SELECT '%%' %s");
        assert_eq!(run("SELECT '%%'", Params::from(())).unwrap(), "SELECT '%'");
    }

    #[test]
    fn should_report_arity_mismatch() {
        assert_eq!(
            run("SELECT %s, %s", Params::from((1,))),
            Err(BindError::ArityMismatch {
                placeholders: 2,
                supplied: 1
            })
        );
        assert_eq!(
            run("SELECT %s", Params::from((1, 2))),
            Err(BindError::ArityMismatch {
                placeholders: 1,
                supplied: 2
            })
        );
    }

    #[test]
    fn should_report_style_and_syntax_errors() {
        assert_eq!(
            run("SELECT %(a)s", Params::from((1,))),
            Err(BindError::WrongParamsKind)
        );
        assert_eq!(
            run("SELECT %s", params! { "a" => 1 }),
            Err(BindError::WrongParamsKind)
        );
        assert_eq!(
            run("SELECT %(b)s", params! { "a" => 1 }),
            Err(BindError::MissingNamedParameter("b".into()))
        );
        assert_eq!(run("SELECT %d", Params::from((1,))), Err(BindError::BadPlaceholder(7)));
        assert_eq!(run("SELECT %", Params::from(())), Err(BindError::BadPlaceholder(7)));
        assert_eq!(
            run("SELECT %(a", params! { "a" => 1 }),
            Err(BindError::BadPlaceholder(7))
        );
        assert_eq!(
            run("SELECT %(a)d", params! { "a" => 1 }),
            Err(BindError::BadPlaceholder(7))
        );
    }

    #[test]
    fn should_surface_encoding_failures() {
        assert_eq!(
            run("SELECT %s", Params::from((f64::NAN,))),
            Err(BindError::EncodingFailure(EncodeError::Unrepresentable(
                "NaN".into()
            )))
        );
    }

    #[test]
    fn should_render_text_only_templates() {
        let template = Template::parse(b"INSERT INTO t (pct) VALUES ").unwrap();
        assert!(!template.has_placeholders());
        assert_eq!(template.render_text().unwrap(), b"INSERT INTO t (pct) VALUES ");

        let template = Template::parse(b" ON DUPLICATE KEY UPDATE a = '%%'").unwrap();
        assert_eq!(
            template.render_text().unwrap(),
            b" ON DUPLICATE KEY UPDATE a = '%'"
        );

        let template = Template::parse(b" ON DUPLICATE KEY UPDATE a = %s").unwrap();
        assert!(template.has_placeholders());
        assert!(template.render_text().is_err());
    }
}
