// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{
    any::{Any, TypeId},
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

#[cfg(feature = "bigdecimal")]
use bigdecimal::BigDecimal;
use time::{Date, Duration, PrimitiveDateTime};

/// Application type that can be passed as a parameter.
///
/// Blanket-implemented for every `Display + Debug + Send + Sync + 'static`
/// type. Encoders are found by exact type first, then by registered
/// predicates; without either the value is rendered with `Display` and quoted.
pub trait SqlObject: Any + fmt::Debug + fmt::Display + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug + fmt::Display + Send + Sync> SqlObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Native value on either side of the codec.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    #[cfg(feature = "bigdecimal")]
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(Date),
    /// MySQL `TIME`: signed and not limited to a day.
    Time(Duration),
    DateTime(PrimitiveDateTime),
    Set(BTreeSet<String>),
    /// Encodes as a parenthesized list, e.g. for `IN %s`.
    List(Vec<Value>),
    Object(Arc<dyn SqlObject>),
}

/// Key of the exact-type encoder map.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
    Set,
    List,
    Object(TypeId),
}

impl Value {
    pub fn object<T: SqlObject>(object: T) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn list<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn tag(&self) -> TypeTag {
        match *self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::Float(_) => TypeTag::Float,
            #[cfg(feature = "bigdecimal")]
            Value::Decimal(_) => TypeTag::Decimal,
            Value::Text(_) => TypeTag::Text,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Date(_) => TypeTag::Date,
            Value::Time(_) => TypeTag::Time,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::Set(_) => TypeTag::Set,
            Value::List(_) => TypeTag::List,
            Value::Object(ref object) => TypeTag::Object((**object).as_any().type_id()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(*self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(x) => Some(x),
            Value::UInt(x) => i64::try_from(x).ok(),
            Value::Bool(x) => Some(x as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::Text(ref text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Value::Bytes(ref bytes) => Some(bytes),
            Value::Text(ref text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// Downcasts an `Object` value.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match *self {
            Value::Object(ref object) => (**object).as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            #[cfg(feature = "bigdecimal")]
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Null => f.write_str("Null"),
            Value::Bool(x) => write!(f, "Bool({})", x),
            Value::Int(x) => write!(f, "Int({})", x),
            Value::UInt(x) => write!(f, "UInt({})", x),
            Value::Float(x) => write!(f, "Float({})", x),
            #[cfg(feature = "bigdecimal")]
            Value::Decimal(ref x) => write!(f, "Decimal({})", x),
            Value::Text(ref x) => write!(f, "Text({:?})", x),
            Value::Bytes(ref x) => write!(f, "Bytes({:?})", String::from_utf8_lossy(x)),
            Value::Date(ref x) => write!(f, "Date({})", x),
            Value::Time(ref x) => write!(f, "Time({})", x),
            Value::DateTime(ref x) => write!(f, "DateTime({})", x),
            Value::Set(ref x) => write!(f, "Set({:?})", x),
            Value::List(ref x) => write!(f, "List({:?})", x),
            Value::Object(ref x) => write!(f, "Object({:?})", x),
        }
    }
}

macro_rules! into_value_impl (
    ($variant:ident, $cast:ty, $($t:ty),+) => (
        $(
            impl From<$t> for Value {
                fn from(x: $t) -> Value {
                    Value::$variant(x as $cast)
                }
            }
        )+
    );
);

into_value_impl!(Int, i64, i8, i16, i32, i64, isize, u8, u16, u32);
into_value_impl!(UInt, u64, u64, usize);
into_value_impl!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(x: bool) -> Value {
        Value::Bool(x)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(x: &'a str) -> Value {
        Value::Text(x.into())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Value {
        Value::Text(x)
    }
}

impl<'a> From<&'a [u8]> for Value {
    fn from(x: &'a [u8]) -> Value {
        Value::Bytes(x.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(x: Vec<u8>) -> Value {
        Value::Bytes(x)
    }
}

impl From<Date> for Value {
    fn from(x: Date) -> Value {
        Value::Date(x)
    }
}

impl From<Duration> for Value {
    fn from(x: Duration) -> Value {
        Value::Time(x)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(x: PrimitiveDateTime) -> Value {
        Value::DateTime(x)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(x: BTreeSet<String>) -> Value {
        Value::Set(x)
    }
}

#[cfg(feature = "bigdecimal")]
impl From<BigDecimal> for Value {
    fn from(x: BigDecimal) -> Value {
        Value::Decimal(x)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(x: Option<T>) -> Value {
        match x {
            Some(x) => x.into(),
            None => Value::Null,
        }
    }
}

impl<'a> From<&'a Value> for Value {
    fn from(x: &'a Value) -> Value {
        x.clone()
    }
}

/// Statement parameters.
#[derive(Clone, PartialEq, Debug)]
pub enum Params {
    /// No substitution at all: the template is sent verbatim, `%%` included.
    Empty,
    /// Values for `%s` placeholders, in order.
    Positional(Vec<Value>),
    /// Values for `%(name)s` placeholders.
    Named(HashMap<String, Value>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        matches!(*self, Params::Empty)
    }

    /// Number of values supplied.
    pub fn len(&self) -> usize {
        match *self {
            Params::Empty => 0,
            Params::Positional(ref values) => values.len(),
            Params::Named(ref values) => values.len(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::Empty
    }
}

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(x: Vec<T>) -> Params {
        Params::Positional(x.into_iter().map(Into::into).collect())
    }
}

impl<'a> From<&'a [Value]> for Params {
    fn from(x: &'a [Value]) -> Params {
        Params::Positional(x.to_vec())
    }
}

impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for Params {
    fn from(x: HashMap<K, V>) -> Params {
        Params::Named(x.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Params {
        Params::Positional(Vec::new())
    }
}

macro_rules! into_params_impl {
    ($([$A:ident,$a:ident]),*) => (
        impl<$($A: Into<Value>,)*> From<($($A,)*)> for Params {
            fn from(x: ($($A,)*)) -> Params {
                let ($($a,)*) = x;
                Params::Positional(vec![$($a.into(),)*])
            }
        }
    );
}

into_params_impl!([A, a]);
into_params_impl!([A, a], [B, b]);
into_params_impl!([A, a], [B, b], [C, c]);
into_params_impl!([A, a], [B, b], [C, c], [D, d]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h], [I, i]);
into_params_impl!([A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h], [I, i], [J, j]);
into_params_impl!(
    [A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h], [I, i], [J, j], [K, k]
);
into_params_impl!(
    [A, a], [B, b], [C, c], [D, d], [E, e], [F, f], [G, g], [H, h], [I, i], [J, j], [K, k],
    [L, l]
);

/// Builds named [`Params`](value/enum.Params.html):
///
/// ```ignore
/// cursor.execute("SELECT %(a)s + %(b)s", params! { "a" => 1, "b" => 2 })?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::Named(::std::collections::HashMap::new())
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::std::collections::HashMap::new();
        $(
            map.insert(::std::string::String::from($name), $crate::Value::from($value));
        )+
        $crate::Params::Named(map)
    }};
}

#[cfg(test)]
mod test {
    use super::{Params, TypeTag, Value};
    use std::any::TypeId;

    #[derive(Debug)]
    struct Point(i32, i32);

    impl std::fmt::Display for Point {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "POINT({} {})", self.0, self.1)
        }
    }

    #[test]
    fn should_convert_into_params() {
        assert_eq!(
            Params::from((1, "a", None::<i32>)),
            Params::Positional(vec![Value::Int(1), Value::Text("a".into()), Value::Null])
        );
        assert_eq!(Params::from(()), Params::Positional(vec![]));
        let named = params! { "a" => 1, "b" => "x" };
        match named {
            Params::Named(map) => {
                assert_eq!(map.get("a"), Some(&Value::Int(1)));
                assert_eq!(map.get("b"), Some(&Value::Text("x".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn should_tag_objects_by_concrete_type() {
        let value = Value::object(Point(1, 2));
        assert_eq!(value.tag(), TypeTag::Object(TypeId::of::<Point>()));
        assert_eq!(value.downcast_ref::<Point>().map(|p| p.0), Some(1));
        assert_eq!(Value::from(7u64).tag(), TypeTag::UInt);
        assert_eq!(Value::Int(7), Value::UInt(7));
    }
}
