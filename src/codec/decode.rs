// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Default decoders for the text protocol.

use mysql_common::constants::{ColumnFlags, ColumnType};

use std::collections::BTreeSet;

use super::{decoder, temporal, DecodeContext, DecoderEntry, DecoderMap};
use crate::{error::DecodeError, value::Value};

pub fn default_decoders() -> DecoderMap {
    use ColumnType::*;

    let mut map = DecoderMap::new();
    let mut set = |column_type: ColumnType, entry: DecoderEntry| {
        map.insert(column_type as u8, entry);
    };

    for column_type in [
        MYSQL_TYPE_TINY,
        MYSQL_TYPE_SHORT,
        MYSQL_TYPE_LONG,
        MYSQL_TYPE_INT24,
        MYSQL_TYPE_LONGLONG,
        MYSQL_TYPE_YEAR,
    ] {
        set(column_type, DecoderEntry::new(Some(decoder(decode_integer))));
    }
    for column_type in [MYSQL_TYPE_FLOAT, MYSQL_TYPE_DOUBLE] {
        set(column_type, DecoderEntry::new(Some(decoder(decode_float))));
    }
    for column_type in [MYSQL_TYPE_DECIMAL, MYSQL_TYPE_NEWDECIMAL] {
        set(column_type, DecoderEntry::new(Some(decoder(decode_decimal))));
    }
    set(MYSQL_TYPE_DATE, DecoderEntry::new(Some(decoder(decode_date))));
    set(MYSQL_TYPE_NEWDATE, DecoderEntry::new(Some(decoder(decode_date))));
    set(MYSQL_TYPE_DATETIME, DecoderEntry::new(Some(decoder(decode_datetime))));
    set(MYSQL_TYPE_TIMESTAMP, DecoderEntry::new(Some(decoder(decode_timestamp))));
    set(MYSQL_TYPE_TIME, DecoderEntry::new(Some(decoder(decode_time))));
    set(MYSQL_TYPE_SET, DecoderEntry::new(Some(decoder(decode_set))));
    for column_type in [MYSQL_TYPE_ENUM, MYSQL_TYPE_JSON] {
        set(column_type, DecoderEntry::new(Some(decoder(decode_text))));
    }
    for column_type in [
        MYSQL_TYPE_STRING,
        MYSQL_TYPE_VAR_STRING,
        MYSQL_TYPE_VARCHAR,
        MYSQL_TYPE_TINY_BLOB,
        MYSQL_TYPE_MEDIUM_BLOB,
        MYSQL_TYPE_LONG_BLOB,
        MYSQL_TYPE_BLOB,
    ] {
        set(
            column_type,
            DecoderEntry::new(Some(decoder(decode_text)))
                .with_override(ColumnFlags::BINARY_FLAG, decoder(decode_bytes)),
        );
    }
    map
}

fn ascii<'a>(raw: &'a [u8], ctx: &DecodeContext<'_>) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(raw).map_err(|_| ctx.error("not an ASCII value"))
}

pub fn decode_integer(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    let s = ascii(raw, ctx)?.trim();
    if let Ok(x) = s.parse::<i64>() {
        return Ok(Value::Int(x));
    }
    s.parse::<u64>()
        .map(Value::UInt)
        .map_err(|e| ctx.error(format!("`{}': {}", s, e)))
}

pub fn decode_float(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    let s = ascii(raw, ctx)?.trim();
    s.parse::<f64>()
        .map(Value::Float)
        .map_err(|e| ctx.error(format!("`{}': {}", s, e)))
}

#[cfg(feature = "bigdecimal")]
pub fn decode_decimal(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    use std::str::FromStr;

    let s = ascii(raw, ctx)?.trim();
    bigdecimal::BigDecimal::from_str(s)
        .map(Value::Decimal)
        .map_err(|e| ctx.error(format!("`{}': {}", s, e)))
}

#[cfg(not(feature = "bigdecimal"))]
pub fn decode_decimal(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    decode_float(raw, ctx)
}

fn or_null(value: Option<Value>) -> Result<Value, DecodeError> {
    Ok(value.unwrap_or(Value::Null))
}

pub fn decode_date(raw: &[u8], _: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    or_null(
        std::str::from_utf8(raw)
            .ok()
            .and_then(temporal::parse_date)
            .map(Value::Date),
    )
}

pub fn decode_datetime(raw: &[u8], _: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    or_null(std::str::from_utf8(raw).ok().and_then(temporal::parse_datetime))
}

pub fn decode_timestamp(raw: &[u8], _: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    or_null(std::str::from_utf8(raw).ok().and_then(temporal::parse_timestamp))
}

pub fn decode_time(raw: &[u8], _: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    or_null(
        std::str::from_utf8(raw)
            .ok()
            .and_then(temporal::parse_time)
            .map(Value::Time),
    )
}

pub fn decode_set(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    let text = ctx.text(raw);
    let items: BTreeSet<String> = text
        .split(',')
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect();
    Ok(Value::Set(items))
}

pub fn decode_text(raw: &[u8], ctx: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    Ok(Value::Text(ctx.text(raw)))
}

pub fn decode_bytes(raw: &[u8], _: &DecodeContext<'_>) -> Result<Value, DecodeError> {
    Ok(Value::Bytes(raw.to_vec()))
}
