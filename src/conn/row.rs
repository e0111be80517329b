// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Row shapes produced by cursors.

use std::{fmt, ops::Index, sync::Arc};

use crate::{native::Field, value::Value};

/// How a cursor hands out rows.
pub trait RowShape {
    type Row;

    /// Row keys for a result set; computed once per set.
    fn keys(fields: &[Field]) -> Arc<[String]> {
        fields.iter().map(|field| field.name.clone()).collect()
    }

    fn make_row(keys: &Arc<[String]>, values: Vec<Value>) -> Self::Row;
}

/// Rows as `Vec<Value>` in column order.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Tuple;

impl RowShape for Tuple {
    type Row = Vec<Value>;

    fn make_row(_: &Arc<[String]>, values: Vec<Value>) -> Vec<Value> {
        values
    }
}

/// Rows as [`MappedRow`], keyed by column name.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Mapping;

impl RowShape for Mapping {
    type Row = MappedRow;

    /// A name seen before in the same result set becomes `table.name`.
    fn keys(fields: &[Field]) -> Arc<[String]> {
        let mut keys: Vec<String> = Vec::with_capacity(fields.len());
        for field in fields {
            if keys.contains(&field.name) {
                keys.push(format!("{}.{}", field.table, field.name));
            } else {
                keys.push(field.name.clone());
            }
        }
        keys.into()
    }

    fn make_row(keys: &Arc<[String]>, values: Vec<Value>) -> MappedRow {
        MappedRow {
            keys: keys.clone(),
            values,
        }
    }
}

/// Column name to value, in column order.
#[derive(Clone, PartialEq)]
pub struct MappedRow {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl MappedRow {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl<'a> Index<&'a str> for MappedRow {
    type Output = Value;

    fn index(&self, key: &'a str) -> &Value {
        self.get(key).unwrap_or(&Value::Null)
    }
}

impl fmt::Debug for MappedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
