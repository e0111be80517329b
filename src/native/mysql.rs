// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! [`NativeConn`] on top of the `mysql` crate.
//!
//! The `mysql` crate hands out result sets as borrowing iterators, so every
//! result of a statement is read to the end while `query` runs and replayed
//! from memory afterwards. Streaming cursors therefore bound memory only on
//! the caller's side.
//!
//! Statements are sent as `&str`; byte strings that are not UTF-8 must be
//! written as hex literals, which is what [`NativeConn::binary_safe`]
//! returning `false` asks for.

use mysql::prelude::Queryable;
use mysql_common::constants::CapabilityFlags;

use std::collections::VecDeque;

use super::{Field, NativeConn, RawRow, StoredResult};
use crate::{
    conn::opts::Opts,
    error::{codes, MySqlError},
    escape::escape_bytes,
};

struct ResultState {
    fields: Option<Vec<Field>>,
    rows: Vec<RawRow>,
    affected_rows: u64,
    insert_id: u64,
    warnings: u32,
    info: Option<String>,
}

enum Pending {
    Result(ResultState),
    Err(MySqlError),
}

pub struct MysqlConn {
    conn: Option<mysql::Conn>,
    current: Option<ResultState>,
    pending: VecDeque<Pending>,
    /// Position of the replayed rows when the current result is streamed.
    cursor: Option<usize>,
    charset: String,
    autocommit: bool,
    no_backslash_escapes: bool,
    /// `SHOW WARNINGS` of a session statement, read before the session
    /// refresh wiped the server's diagnostics.
    diagnostics: Option<VecDeque<Pending>>,
}

fn native_error(err: mysql::Error) -> MySqlError {
    match err {
        mysql::Error::MySqlError(err) => MySqlError {
            state: err.state,
            message: err.message,
            code: err.code,
        },
        mysql::Error::IoError(err) => MySqlError::new(codes::CR_SERVER_LOST, err.to_string()),
        mysql::Error::DriverError(err @ mysql::DriverError::CouldNotConnect(_)) => {
            MySqlError::new(codes::CR_CONN_HOST_ERROR, err.to_string())
        }
        other => MySqlError::new(codes::CR_UNKNOWN_ERROR, other.to_string()),
    }
}

fn gone() -> MySqlError {
    MySqlError::new(codes::CR_SERVER_GONE_ERROR, "MySQL server has gone away")
}

fn field_from_column(column: &mysql::Column) -> Field {
    Field::new(column.name_str().into_owned(), column.column_type())
        .with_table(column.table_str().into_owned())
        .with_flags(column.flags())
        .with_length(column.column_length())
        .with_decimals(column.decimals())
        .with_charset(column.character_set())
}

fn raw_row(row: mysql::Row) -> RawRow {
    mysql::Row::unwrap(row)
        .into_iter()
        .map(|value| match value {
            mysql::Value::NULL => None,
            mysql::Value::Bytes(bytes) => Some(bytes),
            // the text protocol only yields bytes; keep anything else readable
            other => Some(other.as_sql(true).trim_matches('\'').as_bytes().to_vec()),
        })
        .collect()
}

impl MysqlConn {
    pub fn connect(opts: &Opts) -> Result<MysqlConn, MySqlError> {
        let builder = mysql::OptsBuilder::new()
            .ip_or_hostname(Some(opts.get_ip_or_hostname()))
            .tcp_port(opts.get_tcp_port())
            .socket(opts.get_socket())
            .user(opts.get_user())
            .pass(opts.get_pass())
            .db_name(opts.get_db_name())
            .prefer_socket(opts.get_prefer_socket())
            .tcp_connect_timeout(opts.get_tcp_connect_timeout())
            .read_timeout(opts.get_read_timeout())
            .write_timeout(opts.get_write_timeout());
        let conn = mysql::Conn::new(mysql::Opts::from(builder)).map_err(native_error)?;
        let mut native = MysqlConn {
            conn: Some(conn),
            current: None,
            pending: VecDeque::new(),
            cursor: None,
            charset: String::from("utf8mb4"),
            autocommit: false,
            no_backslash_escapes: false,
            diagnostics: None,
        };
        native.refresh_session()?;
        Ok(native)
    }

    fn conn(&mut self) -> Result<&mut mysql::Conn, MySqlError> {
        self.conn.as_mut().ok_or_else(gone)
    }

    /// Re-reads session state the C client would track from status flags.
    fn refresh_session(&mut self) -> Result<(), MySqlError> {
        let row: Option<(String, String, i64)> = self
            .conn()?
            .query_first("SELECT @@character_set_connection, @@SESSION.sql_mode, @@autocommit")
            .map_err(native_error)?;
        if let Some((charset, sql_mode, autocommit)) = row {
            self.charset = charset;
            self.no_backslash_escapes = sql_mode.contains("NO_BACKSLASH_ESCAPES");
            self.autocommit = autocommit != 0;
        }
        Ok(())
    }

    fn read_all(&mut self, statement: &str) -> Result<VecDeque<Pending>, MySqlError> {
        let mut out = VecDeque::new();
        let mut result = self.conn()?.query_iter(statement).map_err(native_error)?;
        'sets: while let Some(mut set) = result.iter() {
            let fields: Vec<Field> = set.columns().as_ref().iter().map(field_from_column).collect();
            let mut rows = Vec::new();
            for row in set.by_ref() {
                match row {
                    Ok(row) => rows.push(raw_row(row)),
                    Err(err) => {
                        out.push_back(Pending::Err(native_error(err)));
                        break 'sets;
                    }
                }
            }
            let info = set.info_str();
            out.push_back(Pending::Result(ResultState {
                fields: if fields.is_empty() { None } else { Some(fields) },
                rows,
                affected_rows: set.affected_rows(),
                insert_id: set.last_insert_id().unwrap_or(0),
                warnings: u32::from(set.warnings()),
                info: if info.is_empty() { None } else { Some(info.into_owned()) },
            }));
        }
        Ok(out)
    }

    fn enter(&mut self, mut state: ResultState) {
        if state.fields.is_some() {
            state.affected_rows = state.rows.len() as u64;
        }
        self.cursor = None;
        self.current = Some(state);
    }
}

fn starts_with_ignore_case(statement: &str, prefix: &str) -> bool {
    statement
        .trim_start()
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// `SET` that may touch the charset, `sql_mode` or autocommit. Assignments to
/// user variables only (`SET @a = 1`) do not.
fn changes_session(statement: &str) -> bool {
    if !starts_with_ignore_case(statement, "SET ") {
        return false;
    }
    let lower = statement.to_ascii_lowercase();
    ["names", "character", "charset", "sql_mode", "autocommit", "@@", "session", "global"]
        .iter()
        .any(|word| lower.contains(word))
}

fn shows_warnings(statement: &str) -> bool {
    let words: Vec<&str> = statement
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .split_whitespace()
        .collect();
    matches!(
        words.as_slice(),
        [show, warnings] if show.eq_ignore_ascii_case("SHOW")
            && warnings.eq_ignore_ascii_case("WARNINGS")
    )
}

impl NativeConn for MysqlConn {
    fn query(&mut self, statement: &[u8]) -> Result<(), MySqlError> {
        let statement = std::str::from_utf8(statement)
            .map_err(|_| MySqlError::new(codes::CR_UNKNOWN_ERROR, "statement is not valid UTF-8"))?;
        self.current = None;
        self.pending.clear();
        self.cursor = None;

        let diagnostics = self.diagnostics.take();
        let mut results = match diagnostics {
            Some(results) if shows_warnings(statement) => results,
            _ => self.read_all(statement)?,
        };
        if changes_session(statement) {
            let warned = matches!(
                results.front(),
                Some(Pending::Result(ResultState { warnings, .. })) if *warnings > 0
            );
            if warned {
                self.diagnostics = Some(self.read_all("SHOW WARNINGS")?);
            }
            self.refresh_session()?;
        }
        match results.pop_front() {
            Some(Pending::Err(err)) => Err(err),
            Some(Pending::Result(state)) => {
                self.enter(state);
                self.pending = results;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn store_result(&mut self) -> Result<Option<StoredResult>, MySqlError> {
        match self.current {
            Some(ResultState {
                fields: Some(ref mut fields),
                ref mut rows,
                ..
            }) => Ok(Some(StoredResult {
                fields: std::mem::take(fields),
                rows: std::mem::take(rows),
            })),
            _ => Ok(None),
        }
    }

    fn use_result(&mut self) -> Result<Option<Vec<Field>>, MySqlError> {
        match self.current {
            Some(ResultState {
                fields: Some(ref fields),
                ..
            }) => {
                self.cursor = Some(0);
                Ok(Some(fields.clone()))
            }
            _ => Ok(None),
        }
    }

    fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Vec<RawRow>, MySqlError> {
        let (pos, state) = match (self.cursor, self.current.as_ref()) {
            (Some(pos), Some(state)) => (pos, state),
            _ => return Ok(Vec::new()),
        };
        let end = match max_rows {
            Some(max) => pos.saturating_add(max).min(state.rows.len()),
            None => state.rows.len(),
        };
        let out = state.rows[pos..end].to_vec();
        self.cursor = Some(end);
        Ok(out)
    }

    fn affected_rows(&self) -> u64 {
        match (self.cursor, self.current.as_ref()) {
            (Some(pos), Some(state)) if pos < state.rows.len() => u64::MAX,
            (_, Some(state)) => state.affected_rows,
            (_, None) => 0,
        }
    }

    fn insert_id(&self) -> u64 {
        self.current.as_ref().map(|state| state.insert_id).unwrap_or(0)
    }

    fn info(&self) -> Option<String> {
        self.current.as_ref().and_then(|state| state.info.clone())
    }

    fn warning_count(&self) -> u32 {
        self.current.as_ref().map(|state| state.warnings).unwrap_or(0)
    }

    fn more_results(&self) -> bool {
        !self.pending.is_empty()
    }

    fn next_result(&mut self) -> Result<bool, MySqlError> {
        match self.pending.pop_front() {
            None => Ok(false),
            Some(Pending::Err(err)) => {
                self.pending.clear();
                self.current = None;
                Err(err)
            }
            Some(Pending::Result(state)) => {
                self.enter(state);
                Ok(true)
            }
        }
    }

    fn escape_string(&self, raw: &[u8]) -> Vec<u8> {
        escape_bytes(raw, self.no_backslash_escapes)
    }

    fn character_set_name(&self) -> String {
        self.charset.clone()
    }

    fn set_character_set(&mut self, charset: &str) -> Result<(), MySqlError> {
        self.conn()?
            .query_drop(format!("SET NAMES {}", charset))
            .map_err(native_error)?;
        self.charset = charset.into();
        Ok(())
    }

    fn server_version(&self) -> (u16, u16, u16) {
        self.conn
            .as_ref()
            .map(|conn| conn.server_version())
            .unwrap_or((0, 0, 0))
    }

    /// The `mysql` crate does not expose the negotiated flags. It always asks
    /// for these, and every server it can talk to (4.1 and later) grants
    /// `CLIENT_TRANSACTIONS`.
    fn capability_flags(&self) -> CapabilityFlags {
        CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_TRANSACTIONS
            | CapabilityFlags::CLIENT_MULTI_STATEMENTS
            | CapabilityFlags::CLIENT_MULTI_RESULTS
    }

    fn get_autocommit(&self) -> bool {
        self.autocommit
    }

    fn autocommit(&mut self, on: bool) -> Result<(), MySqlError> {
        self.conn()?
            .query_drop(format!("SET autocommit={}", on as u8))
            .map_err(native_error)?;
        self.autocommit = on;
        Ok(())
    }

    fn ping(&mut self) -> Result<(), MySqlError> {
        self.conn()?.query_drop("DO 1").map_err(native_error)
    }

    fn thread_id(&self) -> u32 {
        self.conn
            .as_ref()
            .map(|conn| conn.connection_id())
            .unwrap_or(0)
    }

    fn binary_safe(&self) -> bool {
        false
    }

    fn close(&mut self) {
        self.current = None;
        self.pending.clear();
        self.diagnostics = None;
        self.conn = None;
    }
}
