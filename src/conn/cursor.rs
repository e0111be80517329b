// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use mysql_common::constants::{ColumnFlags, ColumnType};

use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    error::{Error, InterfaceError, Result, Warning},
    native::{Field, RawRow},
    value::{Params, Value},
};

use super::{
    row::{RowShape, Tuple},
    Conn, Message,
};

/// Where the rows of a result set live until fetched.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Retrieval {
    /// The whole result set is transferred on execute.
    Buffered,
    /// Rows stay on the server and are transferred on each fetch. The
    /// connection is locked to this cursor until they are exhausted.
    Streaming,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ScrollMode {
    Relative,
    Absolute,
}

/// Column of the current result set.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ColumnDescription {
    pub name: String,
    pub type_code: ColumnType,
    /// Longest value in the column. Unknown for streamed results.
    pub display_size: Option<usize>,
    pub internal_size: u32,
    pub precision: u32,
    pub scale: u8,
    pub null_ok: bool,
    pub flags: ColumnFlags,
}

impl ColumnDescription {
    fn new(field: &Field, display_size: Option<usize>) -> Self {
        ColumnDescription {
            name: field.name.clone(),
            type_code: field.column_type,
            display_size,
            internal_size: field.length,
            precision: field.length,
            scale: field.decimals,
            null_ok: !field.flags.contains(ColumnFlags::NOT_NULL_FLAG),
            flags: field.flags,
        }
    }
}

/// Statement cursor of a [`Conn`].
///
/// `S` decides the row type (see [`Tuple`] and
/// [`Mapping`](crate::Mapping)).
///
/// ```ignore
/// let mut cursor = conn.cursor();
/// cursor.execute("SELECT %s + 1", (41,))?;
/// assert_eq!(cursor.fetch_one()?, Some(vec![Value::Int(42)]));
/// ```
pub struct Cursor<'c, S: RowShape = Tuple> {
    conn: &'c Conn,
    id: u64,
    retrieval: Retrieval,
    shape: PhantomData<S>,
    fields: Vec<Field>,
    keys: Arc<[String]>,
    rows: Vec<Vec<Value>>,
    /// A streamed result still has rows on the server.
    stream_active: bool,
    description: Option<Vec<ColumnDescription>>,
    rownumber: usize,
    rowcount: i64,
    lastrowid: Option<u64>,
    arraysize: usize,
    warning_count: u32,
    info: Option<String>,
    messages: Vec<Message>,
    executed: Option<Vec<u8>>,
    closed: bool,
}

impl<'c, S: RowShape> fmt::Debug for Cursor<'c, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("retrieval", &self.retrieval)
            .field("rownumber", &self.rownumber)
            .field("rowcount", &self.rowcount)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'c, S: RowShape> Cursor<'c, S> {
    pub(crate) fn new(conn: &'c Conn, id: u64, retrieval: Retrieval) -> Self {
        Cursor {
            conn,
            id,
            retrieval,
            shape: PhantomData,
            fields: Vec::new(),
            keys: Vec::new().into(),
            rows: Vec::new(),
            stream_active: false,
            description: None,
            rownumber: 0,
            rowcount: -1,
            lastrowid: None,
            arraysize: 1,
            warning_count: 0,
            info: None,
            messages: Vec::new(),
            executed: None,
            closed: false,
        }
    }

    /// Binds `params` into `template` and executes it. Returns the rowcount.
    ///
    /// `%s` takes positional parameters, `%(name)s` named ones and `%%` is a
    /// literal percent sign. With `Params::Empty` the template is sent as is.
    pub fn execute<T, P>(&mut self, template: T, params: P) -> Result<i64>
    where
        T: AsRef<[u8]>,
        P: Into<Params>,
    {
        let result = self.execute_inner(template.as_ref(), &params.into());
        self.handle(result)
    }

    /// Executes `template` once per parameter row.
    ///
    /// `INSERT`/`REPLACE ... VALUES (...)` statements are sent as a single
    /// multi-row statement; anything else runs row by row and the rowcounts
    /// are summed.
    pub fn execute_many<T, I, P>(&mut self, template: T, rows: I) -> Result<i64>
    where
        T: AsRef<[u8]>,
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let rows: Vec<Params> = rows.into_iter().map(Into::into).collect();
        let result = self.execute_many_inner(template.as_ref(), &rows);
        self.handle(result)
    }

    /// Calls a stored procedure with `args` and returns them unchanged.
    ///
    /// Each argument is stored in a server variable `@_<name>_<n>` first, so
    /// OUT and INOUT values can be selected once every result set of the call
    /// has been consumed. The call itself adds an empty result set after those
    /// produced by the procedure.
    pub fn callproc(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let result = self.callproc_inner(name, &args).map(|()| args);
        self.handle(result)
    }

    pub fn fetch_one(&mut self) -> Result<Option<S::Row>> {
        let result = self.fetch_one_inner();
        self.handle(result)
    }

    /// Fetches up to `size` rows, `arraysize` if `None`.
    pub fn fetch_many(&mut self, size: Option<usize>) -> Result<Vec<S::Row>> {
        let size = size.unwrap_or(self.arraysize);
        let result = self.fetch_inner(Some(size));
        self.handle(result)
    }

    pub fn fetch_all(&mut self) -> Result<Vec<S::Row>> {
        let result = self.fetch_inner(None);
        self.handle(result)
    }

    /// Moves to the next result set. `false` once there are no more.
    pub fn next_set(&mut self) -> Result<bool> {
        let result = self.check_open().and_then(|()| self.next_set_inner());
        self.handle(result)
    }

    pub fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<()> {
        let result = self.scroll_inner(value, mode);
        self.handle(result)
    }

    /// Discards outstanding results and releases the connection. Later calls
    /// fail with `CursorClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = if self.conn.is_closed() {
            Ok(())
        } else {
            self.discard_results()
        };
        self.closed = true;
        self.conn.set_busy(self.id, false);
        self.rows.clear();
        self.stream_active = false;
        self.handle(result)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn connection(&self) -> &'c Conn {
        self.conn
    }

    pub fn retrieval(&self) -> Retrieval {
        self.retrieval
    }

    /// Columns of the current result set, `None` if it has none.
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }

    /// Affected or returned rows of the last statement. `-1` while unknown.
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    pub fn lastrowid(&self) -> Option<u64> {
        self.lastrowid
    }

    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: usize) {
        self.arraysize = arraysize;
    }

    /// Index of the next row in the current result set.
    pub fn rownumber(&self) -> usize {
        self.rownumber
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Statement text of the last execute, as sent.
    pub fn executed(&self) -> Option<&[u8]> {
        self.executed.as_deref()
    }

    fn handle<T: Default>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(x) => Ok(x),
            Err(err) => {
                let handler = self.conn.error_handler();
                match handler(&mut self.messages, err) {
                    Ok(()) => Ok(T::default()),
                    Err(err) => {
                        tracing::warn!(cursor = self.id, error = %err, "cursor error");
                        Err(err)
                    }
                }
            }
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(InterfaceError::CursorClosed.into())
        } else {
            Ok(())
        }
    }

    fn check_executed(&self) -> Result<()> {
        self.check_open()?;
        if self.executed.is_none() {
            return Err(Error::programming("execute() first"));
        }
        Ok(())
    }

    fn execute_inner(&mut self, template: &[u8], params: &Params) -> Result<i64> {
        self.check_open()?;
        self.discard_results()?;
        let statement = self.conn.bind(template, params)?;
        self.query(statement)
    }

    fn execute_many_inner(&mut self, template: &[u8], rows: &[Params]) -> Result<i64> {
        self.check_open()?;
        self.messages.clear();
        if rows.is_empty() {
            return Ok(0);
        }
        match self.conn.rewrite_for_many(template, rows)? {
            Some(statement) => {
                tracing::debug!(cursor = self.id, rows = rows.len(), "batched insert");
                self.discard_results()?;
                self.query(statement)
            }
            None => {
                let mut total = 0;
                for row in rows {
                    total += self.execute_inner(template, row)?;
                }
                Ok(total)
            }
        }
    }

    fn callproc_inner(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.check_open()?;
        for (i, arg) in args.iter().enumerate() {
            let literal = self.conn.literal(arg)?;
            let mut statement = format!("SET @_{}_{}=", name, i).into_bytes();
            statement.extend_from_slice(literal.as_bytes());
            self.discard_results()?;
            self.query(statement)?;
            self.next_set_inner()?;
        }
        let vars: Vec<String> = (0..args.len())
            .map(|i| format!("@_{}_{}", name, i))
            .collect();
        let statement = format!("CALL {}({})", name, vars.join(","));
        self.discard_results()?;
        self.query(statement.into_bytes())?;
        Ok(())
    }

    /// Sends an already bound statement and retrieves its first result.
    fn query(&mut self, statement: Vec<u8>) -> Result<i64> {
        self.messages.clear();
        self.clear_result();
        self.conn.send(Some(self.id), &statement)?;
        self.executed = Some(statement);
        self.retrieve()?;
        Ok(self.rowcount)
    }

    fn clear_result(&mut self) {
        self.fields.clear();
        self.keys = Vec::new().into();
        self.rows.clear();
        self.description = None;
        self.rownumber = 0;
        self.stream_active = false;
    }

    /// Picks up the current result of the connection.
    fn retrieve(&mut self) -> Result<()> {
        let id = self.id;
        self.clear_result();
        match self.retrieval {
            Retrieval::Buffered => {
                let stored = self.conn.on_native(Some(id), |native| native.store_result())?;
                if let Some(stored) = stored {
                    let sizes = display_sizes(stored.fields.len(), &stored.rows);
                    self.rows = self.conn.decode_rows(&stored.fields, stored.rows)?;
                    self.set_fields(stored.fields, sizes.into_iter().map(Some).collect());
                }
            }
            Retrieval::Streaming => {
                let fields = self.conn.on_native(Some(id), |native| native.use_result())?;
                if let Some(fields) = fields {
                    let sizes = vec![None; fields.len()];
                    self.set_fields(fields, sizes);
                    self.stream_active = true;
                }
            }
        }
        self.read_status()?;
        tracing::debug!(
            cursor = id,
            columns = self.fields.len(),
            rowcount = self.rowcount,
            "result set"
        );
        if self.stream_active {
            self.conn.set_busy(id, true);
            Ok(())
        } else {
            self.release_if_done()?;
            self.check_warnings()
        }
    }

    fn set_fields(&mut self, fields: Vec<Field>, sizes: Vec<Option<usize>>) {
        self.keys = S::keys(&fields);
        self.description = Some(
            fields
                .iter()
                .zip(sizes)
                .map(|(field, size)| ColumnDescription::new(field, size))
                .collect(),
        );
        self.fields = fields;
    }

    fn read_status(&mut self) -> Result<()> {
        let (affected, insert_id, warnings, info) = self.conn.on_native(Some(self.id), |native| {
            Ok((
                native.affected_rows(),
                native.insert_id(),
                native.warning_count(),
                native.info(),
            ))
        })?;
        self.rowcount = if affected == u64::MAX {
            -1
        } else {
            affected as i64
        };
        self.lastrowid = Some(insert_id);
        self.warning_count = warnings;
        self.info = info;
        Ok(())
    }

    /// Keeps the connection locked while more results are pending.
    fn release_if_done(&mut self) -> Result<bool> {
        let more = self
            .conn
            .on_native(Some(self.id), |native| Ok(native.more_results()))?;
        self.conn.set_busy(self.id, more);
        Ok(more)
    }

    fn check_warnings(&mut self) -> Result<()> {
        if self.warning_count == 0 {
            return Ok(());
        }
        let raise = self.conn.raise_on_warnings();
        if self.conn.is_busy_with(self.id) {
            // SHOW WARNINGS would be out of sync with the pending results
            let message = format!("There are {} MySQL warnings.", self.warning_count);
            tracing::warn!(cursor = self.id, "{}", message);
            self.messages.push(Message::Info(message.clone()));
            return raise_warning(raise, generic_warning(message));
        }

        let warnings = self.conn.fetch_warnings()?;
        if warnings.is_empty() {
            return match self.info.clone() {
                Some(info) => {
                    tracing::warn!(cursor = self.id, info = %info, "statement info");
                    self.messages.push(Message::Info(info.clone()));
                    raise_warning(raise, generic_warning(info))
                }
                None => Ok(()),
            };
        }
        for warning in &warnings {
            tracing::warn!(
                cursor = self.id,
                level = %warning.level,
                code = warning.code,
                "{}",
                warning.message
            );
            self.messages.push(Message::Warning(warning.clone()));
        }
        match warnings.into_iter().next() {
            Some(first) => raise_warning(raise, first),
            None => Ok(()),
        }
    }

    fn next_set_inner(&mut self) -> Result<bool> {
        let id = self.id;
        if self.stream_active {
            self.conn.on_native(Some(id), |native| native.fetch_rows(None))?;
            self.stream_active = false;
            self.release_if_done()?;
        }
        self.messages.clear();
        if !self.conn.is_busy_with(id) {
            return Ok(false);
        }
        match self.conn.on_native(Some(id), |native| native.next_result()) {
            Ok(true) => {
                self.retrieve()?;
                Ok(true)
            }
            Ok(false) => {
                self.conn.set_busy(id, false);
                Ok(false)
            }
            Err(err) => {
                self.conn.set_busy(id, false);
                Err(err)
            }
        }
    }

    /// Consumes every result this cursor still holds.
    fn discard_results(&mut self) -> Result<()> {
        while self.next_set_inner()? {}
        Ok(())
    }

    fn fetch_one_inner(&mut self) -> Result<Option<S::Row>> {
        Ok(self.fetch_inner(Some(1))?.into_iter().next())
    }

    /// Fetches at most `max` rows, all remaining ones if `None`.
    fn fetch_inner(&mut self, max: Option<usize>) -> Result<Vec<S::Row>> {
        self.check_executed()?;
        let values = match self.retrieval {
            Retrieval::Buffered => {
                let start = self.rownumber.min(self.rows.len());
                let end = match max {
                    Some(max) => start.saturating_add(max).min(self.rows.len()),
                    None => self.rows.len(),
                };
                self.rownumber = end;
                self.rows[start..end].to_vec()
            }
            Retrieval::Streaming => self.fetch_streamed(max)?,
        };
        Ok(values
            .into_iter()
            .map(|values| S::make_row(&self.keys, values))
            .collect())
    }

    fn fetch_streamed(&mut self, max: Option<usize>) -> Result<Vec<Vec<Value>>> {
        if !self.stream_active {
            return Ok(Vec::new());
        }
        let raw = self
            .conn
            .on_native(Some(self.id), |native| native.fetch_rows(max))?;
        let exhausted = max.map(|max| raw.len() < max).unwrap_or(true);
        let values = self.conn.decode_rows(&self.fields, raw)?;
        self.rownumber += values.len();
        if exhausted {
            self.stream_active = false;
            self.read_status()?;
            self.release_if_done()?;
            self.check_warnings()?;
        }
        Ok(values)
    }

    fn scroll_inner(&mut self, value: i64, mode: ScrollMode) -> Result<()> {
        self.check_executed()?;
        let current =
            i64::try_from(self.rownumber).map_err(|_| Error::programming("out of range"))?;
        let target = match mode {
            ScrollMode::Relative => current
                .checked_add(value)
                .ok_or_else(|| Error::programming("out of range"))?,
            ScrollMode::Absolute => value,
        };
        match self.retrieval {
            Retrieval::Buffered => {
                let target = usize::try_from(target)
                    .ok()
                    .filter(|target| *target < self.rows.len())
                    .ok_or_else(|| Error::programming("out of range"))?;
                self.rownumber = target;
            }
            Retrieval::Streaming => {
                if target < current {
                    return Err(Error::not_supported(
                        "backwards scrolling is not supported for streamed results",
                    ));
                }
                let skip = usize::try_from(target - current)
                    .map_err(|_| Error::programming("out of range"))?;
                if skip > 0 && self.fetch_streamed(Some(skip))?.len() < skip {
                    return Err(Error::programming("out of range"));
                }
            }
        }
        Ok(())
    }
}

impl<'c, S: RowShape> Iterator for Cursor<'c, S> {
    type Item = Result<S::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one().transpose()
    }
}

impl<'c, S: RowShape> Drop for Cursor<'c, S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn display_sizes(columns: usize, rows: &[RawRow]) -> Vec<usize> {
    let mut sizes = vec![0; columns];
    for row in rows {
        for (size, value) in sizes.iter_mut().zip(row) {
            if let Some(value) = value {
                *size = (*size).max(value.len());
            }
        }
    }
    sizes
}

fn generic_warning(message: String) -> Warning {
    Warning {
        level: String::from("Warning"),
        code: 0,
        message,
    }
}

fn raise_warning(raise: bool, warning: Warning) -> Result<()> {
    if raise {
        Err(Error::Warning(warning))
    } else {
        Ok(())
    }
}
