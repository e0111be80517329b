// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Boundary to the native client library.
//!
//! Everything below this trait (sockets, packets, authentication) belongs to
//! the native implementation. Everything above it (literals, binding, cursor
//! state, error classes) belongs to this crate.

use mysql_common::constants::{CapabilityFlags, ColumnFlags, ColumnType};

use crate::error::MySqlError;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "mysql-backend")]
pub mod mysql;

/// Column metadata of a result set.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Field {
    pub name: String,
    pub table: String,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    /// Declared display length.
    pub length: u32,
    pub decimals: u8,
    pub charset: u16,
}

impl Field {
    pub fn new<T: Into<String>>(name: T, column_type: ColumnType) -> Self {
        Field {
            name: name.into(),
            table: String::new(),
            column_type,
            flags: ColumnFlags::empty(),
            length: 0,
            decimals: 0,
            charset: 0,
        }
    }

    pub fn with_table<T: Into<String>>(mut self, table: T) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_charset(mut self, charset: u16) -> Self {
        self.charset = charset;
        self
    }
}

/// Row as sent by the server: one optional byte string per column.
pub type RawRow = Vec<Option<Vec<u8>>>;

/// Result set fully transferred to the client.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct StoredResult {
    pub fields: Vec<Field>,
    pub rows: Vec<RawRow>,
}

/// Synchronous native client connection.
///
/// Mirrors the C client API: `query` sends a statement and reads the header of
/// its first result; the result is then either stored (`store_result`) or
/// streamed (`use_result` + `fetch_rows`); `next_result` moves to the next
/// result of a multi-result statement. Metadata accessors describe the current
/// result.
pub trait NativeConn: Send {
    fn query(&mut self, statement: &[u8]) -> Result<(), MySqlError>;

    /// Transfers the current result set. `None` if it has no columns.
    fn store_result(&mut self) -> Result<Option<StoredResult>, MySqlError>;

    /// Starts streaming the current result set. `None` if it has no columns.
    fn use_result(&mut self) -> Result<Option<Vec<Field>>, MySqlError>;

    /// Fetches up to `max_rows` (all if `None`) of the streamed result.
    /// Fewer rows than requested means the result is exhausted.
    fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Vec<RawRow>, MySqlError>;

    /// `u64::MAX` while unknown (e.g. unread streamed result).
    fn affected_rows(&self) -> u64;

    fn insert_id(&self) -> u64;

    fn info(&self) -> Option<String>;

    fn warning_count(&self) -> u32;

    /// Another result follows the current one.
    fn more_results(&self) -> bool;

    /// Advances to the next result: `Ok(true)` if there is one, `Ok(false)`
    /// (repeatedly) when there are no more, `Err` if it failed.
    fn next_result(&mut self) -> Result<bool, MySqlError>;

    /// Escapes bytes for use between single quotes, honoring the current
    /// charset and `NO_BACKSLASH_ESCAPES`.
    fn escape_string(&self, raw: &[u8]) -> Vec<u8>;

    fn character_set_name(&self) -> String;

    fn set_character_set(&mut self, charset: &str) -> Result<(), MySqlError>;

    fn server_version(&self) -> (u16, u16, u16);

    fn capability_flags(&self) -> CapabilityFlags;

    fn get_autocommit(&self) -> bool;

    fn autocommit(&mut self, on: bool) -> Result<(), MySqlError>;

    fn ping(&mut self) -> Result<(), MySqlError>;

    fn thread_id(&self) -> u32;

    /// Whether `query` accepts statements that are not valid UTF-8.
    fn binary_safe(&self) -> bool {
        true
    }

    fn close(&mut self);
}
