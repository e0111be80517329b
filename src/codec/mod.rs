// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Type codec registry.
//!
//! Two directions:
//!
//! * decoders turn a text-protocol column value into a [`Value`], keyed by the
//!   column type reported in the result metadata, with an ordered list of
//!   flag overrides (`BINARY` selects bytes over text);
//! * encoders turn a [`Value`] into a [`Literal`], keyed by the exact
//!   [`TypeTag`] first and then by an ordered list of predicates.
//!
//! The default tables are built once and shared. Each connection layers a
//! private overlay on top, so customizing one connection never touches
//! another and never copies the base tables.

use lazy_static::lazy_static;
use mysql_common::constants::{ColumnFlags, ColumnType};

use std::{
    any::{Any, TypeId},
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use crate::{
    charset::Charset,
    error::{DecodeError, EncodeError},
    escape::Escaper,
    native::Field,
    value::{TypeTag, Value},
};

pub mod decode;
pub mod encode;
pub mod temporal;

/// Escaped SQL text that can be spliced into a statement as is.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Literal(Vec<u8>);

impl Literal {
    /// `NULL`.
    pub fn null() -> Literal {
        Literal(b"NULL".to_vec())
    }

    /// Wraps bytes that are already safe SQL, such as digits or output of the escaper.
    pub fn from_escaped(bytes: Vec<u8>) -> Literal {
        Literal(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Literal({})", String::from_utf8_lossy(&self.0))
    }
}

pub type Encoder =
    Arc<dyn Fn(&Value, &EncodeContext<'_>) -> Result<Literal, EncodeError> + Send + Sync>;

pub type TypePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub type Decoder = Arc<dyn Fn(&[u8], &DecodeContext<'_>) -> Result<Value, DecodeError> + Send + Sync>;

pub fn encoder<F>(f: F) -> Encoder
where
    F: Fn(&Value, &EncodeContext<'_>) -> Result<Literal, EncodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn predicate<F>(f: F) -> TypePredicate
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn decoder<F>(f: F) -> Decoder
where
    F: Fn(&[u8], &DecodeContext<'_>) -> Result<Value, DecodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What an encoder sees besides the value: the table (for nested values) and
/// the session escaper.
pub struct EncodeContext<'a> {
    pub table: &'a EncoderTable,
    pub escaper: &'a Escaper<'a>,
}

impl<'a> EncodeContext<'a> {
    pub fn new(table: &'a EncoderTable, escaper: &'a Escaper<'a>) -> Self {
        EncodeContext { table, escaper }
    }

    /// Encodes a (possibly nested) value through the table.
    pub fn encode(&self, value: &Value) -> Result<Literal, EncodeError> {
        match self.table.lookup(value) {
            Some(encoder) => encoder(value, self),
            None => encode::display_literal(value, self),
        }
    }

    /// Encodes every value of a named parameter map.
    pub fn encode_mapping(
        &self,
        values: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Literal>, EncodeError> {
        values
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.encode(value)?)))
            .collect()
    }

    /// Encodes a sequence of values in order.
    pub fn encode_sequence(&self, values: &[Value]) -> Result<Vec<Literal>, EncodeError> {
        values.iter().map(|value| self.encode(value)).collect()
    }
}

/// What a decoder sees besides the raw bytes.
pub struct DecodeContext<'a> {
    pub charset: Charset,
    pub field: &'a Field,
}

impl<'a> DecodeContext<'a> {
    pub fn text(&self, raw: &[u8]) -> String {
        self.charset.decode(raw).into_owned()
    }

    pub fn error<T: Into<String>>(&self, message: T) -> DecodeError {
        DecodeError {
            column: self.field.name.clone(),
            message: message.into(),
        }
    }
}

/// One layer of encoders.
#[derive(Clone, Default)]
pub struct EncoderMap {
    exact: HashMap<TypeTag, Encoder>,
    ordered: Vec<(TypePredicate, Encoder)>,
}

impl EncoderMap {
    pub fn new() -> Self {
        EncoderMap::default()
    }

    pub fn insert(&mut self, tag: TypeTag, encoder: Encoder) -> &mut Self {
        self.exact.insert(tag, encoder);
        self
    }

    /// Appends a predicate encoder. Earlier registrations win.
    pub fn push(&mut self, predicate: TypePredicate, encoder: Encoder) -> &mut Self {
        self.ordered.push((predicate, encoder));
        self
    }

    fn exact(&self, tag: &TypeTag) -> Option<&Encoder> {
        self.exact.get(tag)
    }

    fn first_match(&self, value: &Value) -> Option<&Encoder> {
        self.ordered
            .iter()
            .find(|(predicate, _)| predicate(value))
            .map(|(_, encoder)| encoder)
    }
}

impl fmt::Debug for EncoderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderMap")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("ordered", &self.ordered.len())
            .finish()
    }
}

/// Shared base encoders plus a per-connection overlay.
///
/// Lookup order: overlay exact type, base exact type, overlay predicates,
/// base predicates (each in registration order). The first match wins.
#[derive(Clone, Debug)]
pub struct EncoderTable {
    base: Arc<EncoderMap>,
    overlay: EncoderMap,
}

impl EncoderTable {
    pub fn new(base: Arc<EncoderMap>) -> Self {
        EncoderTable {
            base,
            overlay: EncoderMap::default(),
        }
    }

    pub fn register(&mut self, tag: TypeTag, encoder: Encoder) {
        self.overlay.insert(tag, encoder);
    }

    /// Exact-type encoder for an application type passed as `Value::Object`.
    pub fn register_for<T: Any>(&mut self, encoder: Encoder) {
        self.overlay
            .insert(TypeTag::Object(TypeId::of::<T>()), encoder);
    }

    pub fn push(&mut self, predicate: TypePredicate, encoder: Encoder) {
        self.overlay.push(predicate, encoder);
    }

    pub fn lookup(&self, value: &Value) -> Option<&Encoder> {
        let tag = value.tag();
        self.overlay
            .exact(&tag)
            .or_else(|| self.base.exact(&tag))
            .or_else(|| self.overlay.first_match(value))
            .or_else(|| self.base.first_match(value))
    }
}

/// Decoders for one column type.
#[derive(Clone, Default)]
pub struct DecoderEntry {
    overrides: Vec<(ColumnFlags, Decoder)>,
    default: Option<Decoder>,
}

impl DecoderEntry {
    pub fn new(default: Option<Decoder>) -> Self {
        DecoderEntry {
            overrides: Vec::new(),
            default,
        }
    }

    /// Adds a decoder used when the column has `flags` set. Earlier overrides win.
    pub fn with_override(mut self, flags: ColumnFlags, decoder: Decoder) -> Self {
        self.overrides.push((flags, decoder));
        self
    }

    pub fn without_default(mut self) -> Self {
        self.default = None;
        self
    }

    fn select(&self, flags: ColumnFlags) -> Option<&Decoder> {
        self.overrides
            .iter()
            .find(|(flag, _)| flags.contains(*flag))
            .map(|(_, decoder)| decoder)
            .or(self.default.as_ref())
    }
}

impl fmt::Debug for DecoderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderEntry")
            .field(
                "overrides",
                &self.overrides.iter().map(|(flag, _)| *flag).collect::<Vec<_>>(),
            )
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Decoders keyed by the numeric column type.
pub type DecoderMap = BTreeMap<u8, DecoderEntry>;

/// Shared base decoders plus a per-connection overlay.
#[derive(Clone, Debug)]
pub struct DecoderTable {
    base: Arc<DecoderMap>,
    overlay: DecoderMap,
}

impl DecoderTable {
    pub fn new(base: Arc<DecoderMap>) -> Self {
        DecoderTable {
            base,
            overlay: DecoderMap::new(),
        }
    }

    pub fn register(&mut self, column_type: ColumnType, entry: DecoderEntry) {
        self.overlay.insert(column_type as u8, entry);
    }

    pub fn entry(&self, column_type: ColumnType) -> Option<&DecoderEntry> {
        let key = column_type as u8;
        self.overlay.get(&key).or_else(|| self.base.get(&key))
    }

    /// Decodes one column value. `NULL` never reaches a decoder.
    pub fn decode(
        &self,
        raw: Option<&[u8]>,
        field: &Field,
        charset: Charset,
    ) -> Result<Value, DecodeError> {
        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(Value::Null),
        };
        let decoder = self
            .entry(field.column_type)
            .and_then(|entry| entry.select(field.flags));
        match decoder {
            Some(decoder) => decoder(raw, &DecodeContext { charset, field }),
            None => Ok(Value::Bytes(raw.to_vec())),
        }
    }
}

/// Base tables handed to new connections.
#[derive(Clone, Debug)]
pub struct Codecs {
    pub encoders: Arc<EncoderMap>,
    pub decoders: Arc<DecoderMap>,
}

lazy_static! {
    static ref DEFAULT_CODECS: Codecs = Codecs {
        encoders: Arc::new(encode::default_encoders()),
        decoders: Arc::new(decode::default_decoders()),
    };
}

impl Default for Codecs {
    fn default() -> Self {
        DEFAULT_CODECS.clone()
    }
}

impl PartialEq for Codecs {
    fn eq(&self, other: &Codecs) -> bool {
        Arc::ptr_eq(&self.encoders, &other.encoders) && Arc::ptr_eq(&self.decoders, &other.decoders)
    }
}

impl Eq for Codecs {}

impl Codecs {
    pub fn encoder_table(&self) -> EncoderTable {
        EncoderTable::new(self.encoders.clone())
    }

    pub fn decoder_table(&self) -> DecoderTable {
        DecoderTable::new(self.decoders.clone())
    }
}

#[cfg(test)]
mod test {
    use mysql_common::constants::{ColumnFlags, ColumnType};
    use time::{Date, Duration, Month, PrimitiveDateTime, Time};

    use super::{decoder, encoder, predicate, Codecs, DecoderEntry, EncodeContext, Literal};
    use crate::{
        charset::Charset,
        escape::{escape_bytes, Escaper},
        native::Field,
        value::{TypeTag, Value},
    };

    #[derive(Debug)]
    struct Celsius(f64);

    impl std::fmt::Display for Celsius {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}C", self.0)
        }
    }

    #[test]
    fn should_prefer_overlay_over_base() {
        let codecs = Codecs::default();
        let mut table = codecs.encoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);

        let literal = EncodeContext::new(&table, &escaper).encode(&Value::Bool(true));
        assert_eq!(literal.unwrap().as_bytes(), b"1");

        table.register(
            TypeTag::Bool,
            encoder(|value, _| match *value {
                Value::Bool(true) => Ok(Literal::from_escaped(b"TRUE".to_vec())),
                _ => Ok(Literal::from_escaped(b"FALSE".to_vec())),
            }),
        );
        let literal = EncodeContext::new(&table, &escaper).encode(&Value::Bool(true));
        assert_eq!(literal.unwrap().as_bytes(), b"TRUE");

        // other tables built from the same base are unaffected
        let other = codecs.encoder_table();
        let literal = EncodeContext::new(&other, &escaper).encode(&Value::Bool(true));
        assert_eq!(literal.unwrap().as_bytes(), b"1");
    }

    #[test]
    fn should_resolve_objects_exact_then_predicate_then_display() {
        let codecs = Codecs::default();
        let mut table = codecs.encoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);
        let value = Value::object(Celsius(21.5));

        let literal = EncodeContext::new(&table, &escaper).encode(&value).unwrap();
        assert_eq!(literal.as_bytes(), b"'21.5C'");

        table.push(
            predicate(|value| value.downcast_ref::<Celsius>().is_some()),
            encoder(|_, _| Ok(Literal::from_escaped(b"first".to_vec()))),
        );
        table.push(
            predicate(|_| true),
            encoder(|_, _| Ok(Literal::from_escaped(b"second".to_vec()))),
        );
        let literal = EncodeContext::new(&table, &escaper).encode(&value).unwrap();
        assert_eq!(literal.as_bytes(), b"first");

        table.register_for::<Celsius>(encoder(|value, _| {
            let c = value.downcast_ref::<Celsius>().map(|c| c.0).unwrap_or_default();
            Ok(Literal::from_escaped(format!("{}", c).into_bytes()))
        }));
        let literal = EncodeContext::new(&table, &escaper).encode(&value).unwrap();
        assert_eq!(literal.as_bytes(), b"21.5");
    }

    #[test]
    fn should_consult_flag_overrides_first() {
        let codecs = Codecs::default();
        let mut table = codecs.decoder_table();
        let text = Field::new("c", ColumnType::MYSQL_TYPE_VAR_STRING);
        let binary = Field::new("c", ColumnType::MYSQL_TYPE_VAR_STRING)
            .with_flags(ColumnFlags::BINARY_FLAG);

        assert_eq!(
            table.decode(Some(b"abc"), &text, Charset::Utf8).unwrap(),
            Value::Text("abc".into())
        );
        assert_eq!(
            table.decode(Some(b"abc"), &binary, Charset::Utf8).unwrap(),
            Value::Bytes(b"abc".to_vec())
        );
        assert_eq!(table.decode(None, &binary, Charset::Utf8).unwrap(), Value::Null);

        let entry = table
            .entry(ColumnType::MYSQL_TYPE_VAR_STRING)
            .cloned()
            .unwrap()
            .without_default();
        table.register(ColumnType::MYSQL_TYPE_VAR_STRING, entry);
        assert_eq!(
            table.decode(Some(b"abc"), &text, Charset::Utf8).unwrap(),
            Value::Bytes(b"abc".to_vec())
        );

        table.register(
            ColumnType::MYSQL_TYPE_GEOMETRY,
            DecoderEntry::new(Some(decoder(|raw, _| Ok(Value::Int(raw.len() as i64))))),
        );
        let geometry = Field::new("g", ColumnType::MYSQL_TYPE_GEOMETRY);
        assert_eq!(
            table.decode(Some(b"1234"), &geometry, Charset::Utf8).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn should_decode_what_was_encoded() {
        let codecs = Codecs::default();
        let encoders = codecs.encoder_table();
        let decoders = codecs.decoder_table();
        let escape = |raw: &[u8]| escape_bytes(raw, false);
        let escaper = Escaper::new(&escape, Charset::Utf8);
        let ctx = EncodeContext::new(&encoders, &escaper);

        let datetime = PrimitiveDateTime::new(
            Date::from_calendar_date(2024, Month::February, 29).unwrap(),
            Time::from_hms_micro(23, 59, 58, 999_999).unwrap(),
        );
        let cases = vec![
            (Value::Int(i64::MIN), ColumnType::MYSQL_TYPE_LONGLONG),
            (Value::Int(i64::MAX), ColumnType::MYSQL_TYPE_LONGLONG),
            (Value::UInt(u64::MAX), ColumnType::MYSQL_TYPE_LONGLONG),
            (Value::Float(0.1 + 0.2), ColumnType::MYSQL_TYPE_DOUBLE),
            (Value::Float(f64::MAX), ColumnType::MYSQL_TYPE_DOUBLE),
            (Value::Float(-f64::MIN_POSITIVE), ColumnType::MYSQL_TYPE_DOUBLE),
            (Value::DateTime(datetime), ColumnType::MYSQL_TYPE_DATETIME),
            (Value::Date(datetime.date()), ColumnType::MYSQL_TYPE_DATE),
            (
                Value::Time(-Duration::new(49 * 3600 + 5, 120_000)),
                ColumnType::MYSQL_TYPE_TIME,
            ),
        ];
        for (value, column_type) in cases {
            let literal = ctx.encode(&value).unwrap().into_bytes();
            // the server returns the stored value without quotes
            let stored = literal
                .strip_prefix(b"'")
                .and_then(|rest| rest.strip_suffix(b"'"))
                .unwrap_or(&literal);
            let field = Field::new("c", column_type);
            assert_eq!(
                decoders.decode(Some(stored), &field, Charset::Utf8).unwrap(),
                value,
                "{}",
                String::from_utf8_lossy(&literal)
            );
        }
    }
}
