// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Multi-row `INSERT ... VALUES` rewriting.

use std::ops::Range;

use crate::{
    bind::{Literals, Template},
    codec::EncodeContext,
    error::BindError,
    value::Params,
};

enum ScanState {
    TopLevel,
    // (delimiter, previous byte was a backslash)
    InQuoted(u8, bool),
}

use self::ScanState::*;

/// Advances the quoting state by one byte.
fn step(state: ScanState, b: u8) -> ScanState {
    match state {
        TopLevel => match b {
            b'\'' | b'"' | b'`' => InQuoted(b, false),
            _ => TopLevel,
        },
        InQuoted(delim, true) => InQuoted(delim, false),
        InQuoted(delim, false) if b == b'\\' && delim != b'`' => InQuoted(delim, true),
        // a doubled delimiter closes and immediately reopens, which is the same thing
        InQuoted(delim, false) if b == delim => TopLevel,
        quoted => quoted,
    }
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// Byte range of the parenthesized tuple that follows ` VALUES`, parentheses
/// included.
pub fn find_values_tuple(template: &[u8]) -> Option<Range<usize>> {
    const KEYWORD: &[u8] = b"values";

    let mut state = TopLevel;
    let mut i = 0;
    while i < template.len() {
        let at_keyword = matches!(state, TopLevel)
            && is_space(template[i])
            && template
                .get(i + 1..i + 1 + KEYWORD.len())
                .map(|word| word.eq_ignore_ascii_case(KEYWORD))
                .unwrap_or(false);
        if at_keyword {
            let mut open = i + 1 + KEYWORD.len();
            while open < template.len() && is_space(template[open]) {
                open += 1;
            }
            if template.get(open) == Some(&b'(') {
                return matching_paren(template, open).map(|close| open..close + 1);
            }
        }
        state = step(state, template[i]);
        i += 1;
    }
    None
}

/// Offset of the `)` closing the `(` at `open`, skipping nested parentheses
/// and quoted text.
fn matching_paren(template: &[u8], open: usize) -> Option<usize> {
    let mut state = TopLevel;
    let mut depth = 0usize;
    for (i, &b) in template.iter().enumerate().skip(open) {
        if let TopLevel = state {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => (),
            }
        }
        state = step(state, b);
    }
    None
}

/// Expands the `VALUES (...)` tuple of `template` once per row.
///
/// Returns `Ok(None)` if the statement can not be batched: no tuple was
/// found, or a placeholder occurs outside of it.
pub fn rewrite_for_many(
    template: &[u8],
    rows: &[Params],
    ctx: &EncodeContext<'_>,
) -> Result<Option<Vec<u8>>, BindError> {
    let range = match find_values_tuple(template) {
        Some(range) => range,
        None => return Ok(None),
    };
    let prefix = Template::parse(&template[..range.start])?;
    let tuple = Template::parse(&template[range.clone()])?;
    let suffix = Template::parse(&template[range.end..])?;
    if prefix.has_placeholders() || suffix.has_placeholders() {
        return Ok(None);
    }

    let mut out = prefix.render_text()?;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        let literals = Literals::encode(row, ctx)?.unwrap_or(Literals::Positional(Vec::new()));
        out.extend_from_slice(&tuple.render(&literals)?);
    }
    out.extend_from_slice(&suffix.render_text()?);
    Ok(Some(out))
}

#[cfg(test)]
mod test {
    use super::{find_values_tuple, rewrite_for_many};
    use crate::{
        charset::Charset,
        codec::{Codecs, EncodeContext},
        error::BindError,
        escape::{escape_bytes, Escaper},
        params,
        value::Params,
    };

    fn tuple(template: &str) -> Option<&str> {
        find_values_tuple(template.as_bytes()).map(|range| &template[range])
    }

    fn rewrite(template: &str, rows: Vec<Params>) -> Result<Option<String>, BindError> {
        let table = Codecs::default().encoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);
        let ctx = EncodeContext::new(&table, &escaper);
        rewrite_for_many(template.as_bytes(), &rows, &ctx)
            .map(|out| out.map(|out| String::from_utf8(out).unwrap()))
    }

    #[test]
    fn should_find_values_tuple() {
        assert_eq!(tuple("INSERT INTO t (a) VALUES (%s)"), Some("(%s)"));
        assert_eq!(tuple("insert into t (a) values(%s)"), Some("(%s)"));
        assert_eq!(tuple("INSERT INTO t (a)\nVALUES\n  (%s, %s)"), Some("(%s, %s)"));
        assert_eq!(
            tuple("INSERT INTO t VALUES (CONCAT(%s, ')'), 'a''b)', \"(\", %s)"),
            Some("(CONCAT(%s, ')'), 'a''b)', \"(\", %s)")
        );
        assert_eq!(
            tuple(r"INSERT INTO t VALUES ('it\'s )', %s) ON DUPLICATE KEY UPDATE a=1"),
            Some(r"('it\'s )', %s)")
        );
    }

    #[test]
    fn should_not_find_values_tuple() {
        assert_eq!(tuple("UPDATE t SET a = %s"), None);
        assert_eq!(tuple("INSERT INTO t SELECT * FROM u"), None);
        assert_eq!(tuple("SELECT ' values (1)'"), None);
        assert_eq!(tuple("INSERT INTO t VALUES (1"), None);
        assert_eq!(tuple("INSERT INTO t VALUESX (1)"), None);
    }

    #[test]
    fn should_expand_tuple_per_row() {
        let rows = vec![Params::from((1, "a")), Params::from((2, "b)")), Params::from((3, "'c"))];
        assert_eq!(
            rewrite("INSERT INTO t (a, b) VALUES (%s, %s)", rows).unwrap().unwrap(),
            r"INSERT INTO t (a, b) VALUES (1, 'a'),(2, 'b)'),(3, '\'c')"
        );
    }

    #[test]
    fn should_keep_suffix_and_collapse_percent() {
        let rows = vec![Params::from((1,)), Params::from((2,))];
        assert_eq!(
            rewrite(
                "INSERT INTO t (a, b) VALUES (%s, '100%%') ON DUPLICATE KEY UPDATE b = '50%%'",
                rows
            )
            .unwrap()
            .unwrap(),
            "INSERT INTO t (a, b) VALUES (1, '100%'),(2, '100%') ON DUPLICATE KEY UPDATE b = '50%'"
        );
    }

    #[test]
    fn should_expand_named_rows() {
        let rows = vec![params! { "a" => 1 }, params! { "a" => 2 }];
        assert_eq!(
            rewrite("REPLACE INTO t VALUES (%(a)s)", rows).unwrap().unwrap(),
            "REPLACE INTO t VALUES (1),(2)"
        );
    }

    #[test]
    fn should_decline_placeholders_outside_tuple() {
        let rows = vec![Params::from((1, 2))];
        assert_eq!(
            rewrite("INSERT INTO t VALUES (%s) ON DUPLICATE KEY UPDATE a = %s", rows).unwrap(),
            None
        );
        assert_eq!(rewrite("DELETE FROM t WHERE a = %s", vec![Params::from((1,))]).unwrap(), None);
    }

    #[test]
    fn should_report_row_arity_mismatch() {
        let rows = vec![Params::from((1,)), Params::from((1, 2))];
        assert_eq!(
            rewrite("INSERT INTO t VALUES (%s)", rows),
            Err(BindError::ArityMismatch {
                placeholders: 1,
                supplied: 2
            })
        );
    }
}
