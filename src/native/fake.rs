// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Scripted in-memory server for tests.

use mysql_common::constants::{CapabilityFlags, ColumnType};

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{Field, NativeConn, RawRow, StoredResult};
use crate::{
    error::{codes, MySqlError},
    escape::escape_bytes,
};

/// One result of a statement.
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    Ok {
        affected_rows: u64,
        insert_id: u64,
        warnings: u32,
        info: Option<String>,
    },
    Rows {
        fields: Vec<Field>,
        rows: Vec<RawRow>,
        warnings: u32,
    },
    Err(MySqlError),
}

impl Reply {
    pub fn ok(affected_rows: u64) -> Reply {
        Reply::Ok {
            affected_rows,
            insert_id: 0,
            warnings: 0,
            info: None,
        }
    }

    pub fn rows(fields: Vec<Field>, rows: Vec<Vec<Option<&str>>>) -> Reply {
        Reply::Rows {
            fields,
            rows: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|col| col.map(|col| col.as_bytes().to_vec()))
                        .collect()
                })
                .collect(),
            warnings: 0,
        }
    }

    pub fn err(code: u16, message: &str) -> Reply {
        Reply::Err(MySqlError::new(code, message))
    }

    pub fn with_warnings(mut self, count: u32) -> Reply {
        match self {
            Reply::Ok {
                ref mut warnings, ..
            }
            | Reply::Rows {
                ref mut warnings, ..
            } => *warnings = count,
            Reply::Err(_) => (),
        }
        self
    }

    pub fn with_insert_id(mut self, id: u64) -> Reply {
        if let Reply::Ok {
            ref mut insert_id, ..
        } = self
        {
            *insert_id = id;
        }
        self
    }

    pub fn with_info(mut self, text: &str) -> Reply {
        if let Reply::Ok { ref mut info, .. } = self {
            *info = Some(text.into());
        }
        self
    }
}

pub(crate) struct Script {
    pub log: Vec<String>,
    replies: HashMap<String, Vec<Reply>>,
    pub warnings: Vec<(String, u16, String)>,
    pub capabilities: CapabilityFlags,
    pub version: (u16, u16, u16),
    pub charset: String,
    pub autocommit: bool,
    pub no_backslash_escapes: bool,
    pub closed: bool,
}

/// Shared server state; every `FakeConn` created from it sees the same script.
#[derive(Clone)]
pub(crate) struct FakeServer(Arc<Mutex<Script>>);

impl FakeServer {
    pub fn new() -> FakeServer {
        FakeServer(Arc::new(Mutex::new(Script {
            log: Vec::new(),
            replies: HashMap::new(),
            warnings: Vec::new(),
            capabilities: CapabilityFlags::CLIENT_TRANSACTIONS
                | CapabilityFlags::CLIENT_MULTI_STATEMENTS
                | CapabilityFlags::CLIENT_MULTI_RESULTS
                | CapabilityFlags::CLIENT_PROTOCOL_41,
            version: (8, 0, 36),
            charset: String::from("utf8mb4"),
            autocommit: true,
            no_backslash_escapes: false,
            closed: false,
        })))
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replies returned every time exactly `statement` is received.
    pub fn on(&self, statement: &str, replies: Vec<Reply>) -> &Self {
        self.script().replies.insert(statement.into(), replies);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.script().log.clone()
    }

    pub fn clear_log(&self) {
        self.script().log.clear();
    }

    pub fn connect(&self) -> FakeConn {
        FakeConn {
            server: self.clone(),
            current: None,
            pending: VecDeque::new(),
            streaming: None,
            affected_rows: 0,
            insert_id: 0,
            warnings: 0,
            info: None,
        }
    }
}

pub(crate) struct FakeConn {
    server: FakeServer,
    current: Option<Reply>,
    pending: VecDeque<Reply>,
    /// Rows read so far from a streamed result.
    streaming: Option<usize>,
    affected_rows: u64,
    insert_id: u64,
    warnings: u32,
    info: Option<String>,
}

fn string_field(name: &str) -> Field {
    Field::new(name, ColumnType::MYSQL_TYPE_VAR_STRING)
}

impl FakeConn {
    fn builtin_replies(script: &mut Script, text: &str) -> Vec<Reply> {
        if text == "SHOW WARNINGS" {
            let rows = script
                .warnings
                .iter()
                .map(|(level, code, message)| {
                    vec![
                        Some(level.as_bytes().to_vec()),
                        Some(code.to_string().into_bytes()),
                        Some(message.as_bytes().to_vec()),
                    ]
                })
                .collect();
            return vec![Reply::Rows {
                fields: vec![
                    string_field("Level"),
                    Field::new("Code", ColumnType::MYSQL_TYPE_LONG),
                    string_field("Message"),
                ],
                rows,
                warnings: 0,
            }];
        }
        if let Some(mode) = text.strip_prefix("SET SESSION sql_mode=") {
            script.no_backslash_escapes = mode.contains("NO_BACKSLASH_ESCAPES");
        }
        vec![Reply::ok(0)]
    }

    fn enter(&mut self, reply: Reply) {
        self.streaming = None;
        match reply {
            Reply::Ok {
                affected_rows,
                insert_id,
                warnings,
                ref info,
            } => {
                self.affected_rows = affected_rows;
                self.insert_id = insert_id;
                self.warnings = warnings;
                self.info = info.clone();
            }
            Reply::Rows {
                ref rows,
                warnings,
                ..
            } => {
                self.affected_rows = rows.len() as u64;
                self.insert_id = 0;
                self.warnings = warnings;
                self.info = None;
            }
            Reply::Err(_) => (),
        }
        self.current = Some(reply);
    }

    fn unread(&self) -> bool {
        match (&self.current, self.streaming) {
            (Some(Reply::Rows { rows, .. }), Some(pos)) => pos < rows.len(),
            _ => false,
        }
    }
}

impl NativeConn for FakeConn {
    fn query(&mut self, statement: &[u8]) -> Result<(), MySqlError> {
        if self.unread() || !self.pending.is_empty() {
            return Err(MySqlError::new(
                codes::CR_COMMANDS_OUT_OF_SYNC,
                "Commands out of sync; you can't run this command now",
            ));
        }
        let text = String::from_utf8_lossy(statement).into_owned();
        let mut replies = {
            let mut script = self.server.script();
            if script.closed {
                return Err(MySqlError::new(
                    codes::CR_SERVER_GONE_ERROR,
                    "MySQL server has gone away",
                ));
            }
            script.log.push(text.clone());
            match script.replies.get(&text) {
                Some(replies) => replies.clone(),
                None => FakeConn::builtin_replies(&mut script, &text),
            }
        }
        .into_iter();
        self.current = None;
        match replies.next() {
            Some(Reply::Err(err)) => Err(err),
            Some(first) => {
                self.enter(first);
                self.pending = replies.collect();
                Ok(())
            }
            None => {
                self.enter(Reply::ok(0));
                Ok(())
            }
        }
    }

    fn store_result(&mut self) -> Result<Option<StoredResult>, MySqlError> {
        match self.current.take() {
            Some(Reply::Rows { fields, rows, .. }) => {
                self.affected_rows = rows.len() as u64;
                Ok(Some(StoredResult { fields, rows }))
            }
            other => {
                self.current = other;
                Ok(None)
            }
        }
    }

    fn use_result(&mut self) -> Result<Option<Vec<Field>>, MySqlError> {
        match self.current {
            Some(Reply::Rows { ref fields, .. }) => {
                self.streaming = Some(0);
                self.affected_rows = u64::MAX;
                self.warnings = 0;
                Ok(Some(fields.clone()))
            }
            _ => Ok(None),
        }
    }

    fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Vec<RawRow>, MySqlError> {
        let pos = match self.streaming {
            Some(pos) => pos,
            None => return Ok(Vec::new()),
        };
        let (out, total, warnings) = match self.current {
            Some(Reply::Rows {
                ref rows, warnings, ..
            }) => {
                let end = match max_rows {
                    Some(max) => (pos + max).min(rows.len()),
                    None => rows.len(),
                };
                (rows[pos..end].to_vec(), rows.len(), warnings)
            }
            _ => return Ok(Vec::new()),
        };
        let pos = pos + out.len();
        self.streaming = Some(pos);
        if pos == total && max_rows.map(|max| out.len() < max).unwrap_or(true) {
            self.affected_rows = total as u64;
            self.warnings = warnings;
        }
        Ok(out)
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }

    fn info(&self) -> Option<String> {
        self.info.clone()
    }

    fn warning_count(&self) -> u32 {
        self.warnings
    }

    fn more_results(&self) -> bool {
        !self.pending.is_empty()
    }

    fn next_result(&mut self) -> Result<bool, MySqlError> {
        match self.pending.pop_front() {
            None => Ok(false),
            Some(Reply::Err(err)) => {
                self.pending.clear();
                self.current = None;
                Err(err)
            }
            Some(reply) => {
                self.enter(reply);
                Ok(true)
            }
        }
    }

    fn escape_string(&self, raw: &[u8]) -> Vec<u8> {
        escape_bytes(raw, self.server.script().no_backslash_escapes)
    }

    fn character_set_name(&self) -> String {
        self.server.script().charset.clone()
    }

    fn set_character_set(&mut self, charset: &str) -> Result<(), MySqlError> {
        let mut script = self.server.script();
        script.log.push(format!("SET NAMES {}", charset));
        script.charset = charset.into();
        Ok(())
    }

    fn server_version(&self) -> (u16, u16, u16) {
        self.server.script().version
    }

    fn capability_flags(&self) -> CapabilityFlags {
        self.server.script().capabilities
    }

    fn get_autocommit(&self) -> bool {
        self.server.script().autocommit
    }

    fn autocommit(&mut self, on: bool) -> Result<(), MySqlError> {
        let mut script = self.server.script();
        script.log.push(format!("SET autocommit={}", on as u8));
        script.autocommit = on;
        Ok(())
    }

    fn ping(&mut self) -> Result<(), MySqlError> {
        if self.server.script().closed {
            return Err(MySqlError::new(
                codes::CR_SERVER_GONE_ERROR,
                "MySQL server has gone away",
            ));
        }
        Ok(())
    }

    fn thread_id(&self) -> u32 {
        42
    }

    fn close(&mut self) {
        self.current = None;
        self.pending.clear();
        self.server.script().log.push(String::from("QUIT"));
    }
}
