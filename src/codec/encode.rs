// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Default encoders.

use super::{encoder, temporal, EncodeContext, EncoderMap, Literal};
use crate::{
    error::EncodeError,
    value::{TypeTag, Value},
};

pub fn default_encoders() -> EncoderMap {
    let mut map = EncoderMap::new();
    for tag in [
        TypeTag::Null,
        TypeTag::Bool,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Float,
        TypeTag::Decimal,
        TypeTag::Text,
        TypeTag::Bytes,
        TypeTag::Date,
        TypeTag::Time,
        TypeTag::DateTime,
        TypeTag::Set,
        TypeTag::List,
    ] {
        map.insert(tag, encoder(encode_builtin));
    }
    map
}

/// Fallback for values without a registered encoder: application objects are
/// rendered with `Display` and quoted as text.
pub fn display_literal(value: &Value, ctx: &EncodeContext<'_>) -> Result<Literal, EncodeError> {
    match *value {
        Value::Object(ref object) => ctx.escaper.text(&object.to_string()),
        _ => encode_builtin(value, ctx),
    }
}

pub fn encode_builtin(value: &Value, ctx: &EncodeContext<'_>) -> Result<Literal, EncodeError> {
    let literal = match *value {
        Value::Null => Literal::null(),
        Value::Bool(x) => digits(if x { "1" } else { "0" }),
        Value::Int(x) => digits(&x.to_string()),
        Value::UInt(x) => digits(&x.to_string()),
        Value::Float(x) => digits(&format_float(x)?),
        #[cfg(feature = "bigdecimal")]
        Value::Decimal(ref x) => digits(&x.to_string()),
        Value::Text(ref text) => ctx.escaper.text(text)?,
        Value::Bytes(ref bytes) => ctx.escaper.bytes(bytes),
        Value::Date(date) => ctx.escaper.quote(temporal::format_date(date).as_bytes()),
        Value::DateTime(datetime) => {
            ctx.escaper
                .quote(temporal::format_datetime(datetime).as_bytes())
        }
        Value::Time(duration) => ctx.escaper.quote(temporal::format_time(duration).as_bytes()),
        Value::Set(ref items) => {
            let joined = items.iter().map(String::as_str).collect::<Vec<_>>().join(",");
            ctx.escaper.text(&joined)?
        }
        Value::List(ref items) => {
            let mut out = vec![b'('];
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(ctx.encode(item)?.as_bytes());
            }
            out.push(b')');
            Literal::from_escaped(out)
        }
        Value::Object(ref object) => ctx.escaper.text(&object.to_string())?,
    };
    Ok(literal)
}

fn digits(s: &str) -> Literal {
    Literal::from_escaped(s.as_bytes().to_vec())
}

/// Shortest digits that parse back to the same `f64`, in exponent form
/// outside `1e-4..1e16` (`1e+20`, `1.25e-07`).
pub fn format_float(x: f64) -> Result<String, EncodeError> {
    if !x.is_finite() {
        return Err(EncodeError::Unrepresentable(x.to_string()));
    }
    if x == 0.0 {
        return Ok(String::from("0"));
    }
    let sci = format!("{:e}", x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if (-4..16).contains(&exp) {
        return Ok(x.to_string());
    }
    let sign = if exp < 0 { '-' } else { '+' };
    Ok(format!("{}e{}{:02}", mantissa, sign, exp.abs()))
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use time::{Date, Duration, Month, PrimitiveDateTime, Time};

    use super::format_float;
    use crate::{
        charset::Charset,
        codec::{Codecs, EncodeContext},
        escape::{escape_bytes, Escaper},
        value::Value,
    };

    fn encode(value: Value) -> String {
        let table = Codecs::default().encoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);
        let literal = EncodeContext::new(&table, &escaper).encode(&value).unwrap();
        String::from_utf8(literal.into_bytes()).unwrap()
    }

    #[test]
    fn should_format_floats_with_shortest_digits() {
        assert_eq!(format_float(0.1).unwrap(), "0.1");
        assert_eq!(format_float(1.5).unwrap(), "1.5");
        assert_eq!(format_float(-2.0).unwrap(), "-2");
        assert_eq!(format_float(1e20).unwrap(), "1e+20");
        assert_eq!(format_float(1.25e-7).unwrap(), "1.25e-07");
        assert_eq!(format_float(0.000125).unwrap(), "0.000125");
        assert_eq!(format_float(123456789.125).unwrap(), "123456789.125");
        assert_eq!(format_float(1.0 / 3.0).unwrap(), "0.3333333333333333");
        assert_eq!(format_float(0.1 + 0.2).unwrap(), "0.30000000000000004");
        assert_eq!(
            format_float(f64::MAX).unwrap(),
            "1.7976931348623157e+308"
        );
        assert_eq!(format_float(-5e-324).unwrap(), "-5e-324");
        for x in [0.1 + 0.2, f64::MAX, f64::MIN_POSITIVE, -1.0 / 3.0, 1e16] {
            assert_eq!(format_float(x).unwrap().parse::<f64>().unwrap(), x);
        }
        assert!(format_float(f64::NAN).is_err());
        assert!(format_float(f64::INFINITY).is_err());
    }

    #[test]
    fn should_encode_scalars() {
        assert_eq!(encode(Value::Null), "NULL");
        assert_eq!(encode(Value::Bool(true)), "1");
        assert_eq!(encode(Value::Bool(false)), "0");
        assert_eq!(encode(Value::Int(i64::MIN)), "-9223372036854775808");
        assert_eq!(encode(Value::UInt(u64::MAX)), "18446744073709551615");
        assert_eq!(encode(Value::Text("".into())), "''");
        assert_eq!(encode(Value::Text("a'b".into())), "'a\\'b'");
        assert_eq!(encode(Value::Bytes(b"\x00".to_vec())), "_binary'\\0'");
    }

    #[test]
    fn should_encode_temporal_values() {
        let date = Date::from_calendar_date(2020, Month::January, 2).unwrap();
        assert_eq!(encode(Value::Date(date)), "'2020-01-02'");
        let datetime = PrimitiveDateTime::new(date, Time::from_hms_micro(3, 4, 5, 6).unwrap());
        assert_eq!(encode(Value::DateTime(datetime)), "'2020-01-02 03:04:05.000006'");
        assert_eq!(encode(Value::Time(Duration::seconds(-3661))), "'-0 01:01:01'");
    }

    #[test]
    fn should_encode_collections() {
        let set: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(encode(Value::Set(set)), "'a,b'");
        assert_eq!(
            encode(Value::list(vec![Value::Int(1), Value::Text("x".into()), Value::Null])),
            "(1,'x',NULL)"
        );
        assert_eq!(
            encode(Value::List(vec![Value::list(vec![1, 2]), Value::Int(3)])),
            "((1,2),3)"
        );
    }

    #[cfg(feature = "bigdecimal")]
    #[test]
    fn should_encode_decimals_verbatim() {
        use std::str::FromStr;
        let decimal = bigdecimal::BigDecimal::from_str("12.340").unwrap();
        assert_eq!(encode(Value::Decimal(decimal)), "12.340");
    }
}
