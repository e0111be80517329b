// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use mysql_common::constants::{CapabilityFlags, ColumnType};

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    sync::Arc,
};

use crate::{
    bind,
    charset::Charset,
    codec::{
        decode, decoder, DecoderEntry, DecoderTable, EncodeContext, Encoder, EncoderTable,
        Literal, TypePredicate,
    },
    error::{BindError, Error, InterfaceError, MySqlError, Result, Warning},
    escape::Escaper,
    native::{Field, NativeConn, RawRow},
    rewrite,
    value::{Params, TypeTag, Value},
};

use self::{
    cursor::{Cursor, Retrieval},
    opts::Opts,
    row::{Mapping, RowShape, Tuple},
    transaction::Transaction,
};

pub mod cursor;
pub mod opts;
pub mod row;
pub mod transaction;

/// Entry of a cursor's or connection's message list.
#[derive(Clone, PartialEq, Debug)]
pub enum Message {
    /// Row of `SHOW WARNINGS`.
    Warning(Warning),
    /// Informational text, e.g. the server's info string or a warning count.
    Info(String),
    /// Error that went through the error handler.
    Error(Error),
}

/// Receives every error of a cursor or connection together with its message
/// list. Returning `Ok(())` suppresses the error and the operation yields its
/// neutral value (`0`, `None`, empty).
pub type ErrorHandler = Arc<dyn Fn(&mut Vec<Message>, Error) -> Result<()> + Send + Sync>;

/// Records the error and returns it.
pub fn default_error_handler(messages: &mut Vec<Message>, err: Error) -> Result<()> {
    messages.push(Message::Error(err.clone()));
    Err(err)
}

const MIN_CHARSET_VERSION: (u16, u16, u16) = (4, 1, 0);

struct ConnInner {
    native: Option<Box<dyn NativeConn>>,
    charset: Charset,
    charset_name: String,
    encoders: EncoderTable,
    decoders: DecoderTable,
    binary_prefix: bool,
    raise_on_warnings: bool,
    transactional: bool,
    server_version: (u16, u16, u16),
    messages: Vec<Message>,
    error_handler: ErrorHandler,
    /// Cursor with results still pending on the server.
    busy: Option<u64>,
}

impl ConnInner {
    fn native(&mut self) -> Result<&mut dyn NativeConn> {
        match self.native {
            Some(ref mut native) => Ok(native.as_mut()),
            None => Err(InterfaceError::ConnectionClosed.into()),
        }
    }
}

/// Session with a MySQL server.
///
/// `Conn` is `Send` but not `Sync`. Cursors borrow it; exactly one of them
/// may hold unread results at a time, any other statement meanwhile fails with
/// "commands out of sync".
pub struct Conn {
    inner: RefCell<ConnInner>,
    next_cursor_id: Cell<u64>,
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Conn")
                .field("open", &inner.native.is_some())
                .field("charset", &inner.charset_name)
                .field("server_version", &inner.server_version)
                .field("transactional", &inner.transactional)
                .finish(),
            Err(_) => f.debug_struct("Conn").finish(),
        }
    }
}

impl Conn {
    /// Connects through the `mysql` crate.
    #[cfg(feature = "mysql-backend")]
    pub fn new<T, E>(opts: T) -> Result<Conn>
    where
        Opts: TryFrom<T, Error = E>,
        Error: From<E>,
    {
        let opts = Opts::try_from(opts)?;
        let native = crate::native::mysql::MysqlConn::connect(&opts)?;
        Conn::with_native(Box::new(native), opts)
    }

    /// Sets up a session over an already connected native connection.
    pub fn with_native<T: Into<Opts>>(native: Box<dyn NativeConn>, opts: T) -> Result<Conn> {
        let opts = opts.into();
        let codecs = opts.get_codecs();
        let server_version = native.server_version();
        let transactional = native
            .capability_flags()
            .contains(CapabilityFlags::CLIENT_TRANSACTIONS);
        let charset_name = native.character_set_name();
        let charset = Charset::from_name(&charset_name).unwrap_or_else(|| {
            tracing::warn!(charset = %charset_name, "unsupported server charset, assuming utf8");
            Charset::Utf8
        });

        let mut decoders = codecs.decoder_table();
        if !opts.get_use_unicode() {
            for column_type in TEXT_COLUMN_TYPES {
                decoders.register(
                    column_type,
                    DecoderEntry::new(Some(decoder(decode::decode_bytes))),
                );
            }
        }

        let conn = Conn {
            inner: RefCell::new(ConnInner {
                native: Some(native),
                charset,
                charset_name,
                encoders: codecs.encoder_table(),
                decoders,
                binary_prefix: opts.get_binary_prefix(),
                raise_on_warnings: opts.get_raise_on_warnings(),
                transactional,
                server_version,
                messages: Vec::new(),
                error_handler: Arc::new(default_error_handler),
                busy: None,
            }),
            next_cursor_id: Cell::new(0),
        };
        tracing::debug!(
            server_version = ?server_version,
            transactional,
            thread_id = conn.thread_id().unwrap_or_default(),
            "connected"
        );

        for statement in opts.get_init() {
            conn.run(statement.as_bytes())?;
        }
        if let Some(charset) = opts.get_charset() {
            conn.set_character_set(charset)?;
        }
        if let Some(sql_mode) = opts.get_sql_mode() {
            conn.set_sql_mode(sql_mode)?;
        }
        if transactional {
            if let Some(on) = opts.get_autocommit() {
                conn.autocommit(on)?;
            }
        }
        Ok(conn)
    }

    /// Buffered cursor producing `Vec<Value>` rows.
    pub fn cursor(&self) -> Cursor<'_, Tuple> {
        self.cursor_with(Retrieval::Buffered, Tuple)
    }

    /// Buffered cursor producing [`MappedRow`](crate::MappedRow)s.
    pub fn dict_cursor(&self) -> Cursor<'_, Mapping> {
        self.cursor_with(Retrieval::Buffered, Mapping)
    }

    /// Streaming cursor producing `Vec<Value>` rows.
    ///
    /// The connection stays locked to it until its rows are read. With the
    /// `mysql-backend` connection the rows are still read into memory when
    /// the statement runs; only decoding is deferred.
    pub fn ss_cursor(&self) -> Cursor<'_, Tuple> {
        self.cursor_with(Retrieval::Streaming, Tuple)
    }

    /// Streaming cursor producing mapped rows.
    pub fn ss_dict_cursor(&self) -> Cursor<'_, Mapping> {
        self.cursor_with(Retrieval::Streaming, Mapping)
    }

    pub fn cursor_with<S: RowShape>(&self, retrieval: Retrieval, _shape: S) -> Cursor<'_, S> {
        let id = self.next_cursor_id.get() + 1;
        self.next_cursor_id.set(id);
        Cursor::new(self, id, retrieval)
    }

    /// Commits the current transaction. A no-op without transaction support.
    pub fn commit(&self) -> Result<()> {
        let result = if self.inner.borrow().transactional {
            tracing::debug!("commit");
            self.run(b"COMMIT")
        } else {
            Ok(())
        };
        self.handle(result)
    }

    /// Rolls back the current transaction.
    pub fn rollback(&self) -> Result<()> {
        let result = if self.inner.borrow().transactional {
            tracing::debug!("rollback");
            self.run(b"ROLLBACK")
        } else {
            Err(Error::not_supported("transactions are not supported"))
        };
        self.handle(result)
    }

    /// Starts a transaction; the guard rolls it back unless committed.
    ///
    /// `BEGIN` is only sent while autocommit is on, otherwise a transaction
    /// is already open.
    pub fn start_transaction(&self) -> Result<Transaction<'_>> {
        let result = self
            .on_native(None, |native| Ok(native.get_autocommit()))
            .and_then(|on| {
                if on {
                    tracing::debug!("begin");
                    self.run(b"BEGIN")?;
                }
                Ok(())
            });
        self.handle(result)?;
        Ok(Transaction::new(self))
    }

    /// Closes the session. Cursors of this connection fail from now on.
    pub fn close(&self) -> Result<()> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            match inner.native.take() {
                Some(mut native) => {
                    native.close();
                    inner.busy = None;
                    tracing::debug!("connection closed");
                    Ok(())
                }
                None => Err(InterfaceError::ConnectionClosed.into()),
            }
        };
        self.handle(result)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().native.is_none()
    }

    /// Turns autocommit on or off if it differs from the current setting.
    pub fn autocommit(&self, on: bool) -> Result<()> {
        let result = self.on_native(None, |native| {
            if native.get_autocommit() != on {
                native.autocommit(on)?;
            }
            Ok(())
        });
        if result.is_ok() {
            tracing::debug!(on, "autocommit");
        }
        self.handle(result)
    }

    pub fn get_autocommit(&self) -> Result<bool> {
        let result = self.on_native(None, |native| Ok(native.get_autocommit()));
        self.handle(result)
    }

    /// Switches the connection charset and the codec charset together.
    pub fn set_character_set(&self, name: &str) -> Result<()> {
        let result = self.set_character_set_inner(name);
        self.handle(result)
    }

    fn set_character_set_inner(&self, name: &str) -> Result<()> {
        let charset = Charset::from_name(name)
            .ok_or_else(|| Error::not_supported(format!("character set `{}' is not supported", name)))?;
        if self.inner.borrow().charset_name == name {
            return Ok(());
        }
        if self.server_version() < MIN_CHARSET_VERSION {
            return Err(Error::not_supported(
                "server is too old to set the charset",
            ));
        }
        self.on_native(None, |native| native.set_character_set(name))?;
        let mut inner = self.inner.borrow_mut();
        inner.charset = charset;
        inner.charset_name = name.to_string();
        tracing::debug!(charset = %name, "character set changed");
        Ok(())
    }

    /// `SET SESSION sql_mode='<mode>'`.
    pub fn set_sql_mode(&self, sql_mode: &str) -> Result<()> {
        let result = if self.server_version() < MIN_CHARSET_VERSION {
            Err(Error::not_supported("server is too old to set sql_mode"))
        } else {
            self.literal(&Value::from(sql_mode)).and_then(|mode| {
                let mut statement = b"SET SESSION sql_mode=".to_vec();
                statement.extend_from_slice(mode.as_bytes());
                self.run(&statement)
            })
        };
        if result.is_ok() {
            tracing::debug!(sql_mode, "sql_mode changed");
        }
        self.handle(result)
    }

    /// Rows of `SHOW WARNINGS` for the last statement.
    pub fn show_warnings(&self) -> Result<Vec<Warning>> {
        let result = self.fetch_warnings();
        self.handle(result)
    }

    pub fn ping(&self) -> Result<()> {
        let result = self.on_native(None, |native| native.ping());
        self.handle(result)
    }

    /// Encodes `value` as SQL text with the connection's codecs.
    pub fn literal(&self, value: &Value) -> Result<Literal> {
        self.with_encoder(|ctx| Ok(ctx.encode(value)?))
    }

    /// Escapes bytes for use between single quotes.
    pub fn escape_string(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut inner = self.inner.borrow_mut();
        Ok(inner.native()?.escape_string(raw))
    }

    pub fn insert_id(&self) -> Result<u64> {
        self.on_native(None, |native| Ok(native.insert_id()))
    }

    pub fn affected_rows(&self) -> Result<u64> {
        self.on_native(None, |native| Ok(native.affected_rows()))
    }

    pub fn info(&self) -> Result<Option<String>> {
        self.on_native(None, |native| Ok(native.info()))
    }

    pub fn thread_id(&self) -> Result<u32> {
        self.on_native(None, |native| Ok(native.thread_id()))
    }

    pub fn server_version(&self) -> (u16, u16, u16) {
        self.inner.borrow().server_version
    }

    pub fn character_set_name(&self) -> String {
        self.inner.borrow().charset_name.clone()
    }

    /// Whether the server supports transactions.
    pub fn is_transactional(&self) -> bool {
        self.inner.borrow().transactional
    }

    /// Messages recorded by connection-level operations.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.borrow().messages.clone()
    }

    pub fn clear_messages(&self) {
        self.inner.borrow_mut().messages.clear();
    }

    /// Replaces the error handler for this connection and its cursors.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&mut Vec<Message>, Error) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.borrow_mut().error_handler = Arc::new(handler);
    }

    /// Exact-type encoder for this connection only.
    pub fn register_encoder(&self, tag: TypeTag, encoder: Encoder) {
        self.inner.borrow_mut().encoders.register(tag, encoder);
    }

    /// Encoder for an application type passed as `Value::Object`.
    pub fn register_encoder_for<T: Any>(&self, encoder: Encoder) {
        self.inner.borrow_mut().encoders.register_for::<T>(encoder);
    }

    /// Predicate encoder consulted after exact types. Earlier registrations win.
    pub fn push_encoder(&self, predicate: TypePredicate, encoder: Encoder) {
        self.inner.borrow_mut().encoders.push(predicate, encoder);
    }

    pub fn register_decoder(&self, column_type: ColumnType, entry: DecoderEntry) {
        self.inner.borrow_mut().decoders.register(column_type, entry);
    }

    pub(crate) fn error_handler(&self) -> ErrorHandler {
        self.inner.borrow().error_handler.clone()
    }

    pub(crate) fn raise_on_warnings(&self) -> bool {
        self.inner.borrow().raise_on_warnings
    }

    fn handle<T: Default>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(x) => Ok(x),
            Err(err) => {
                let handler = self.error_handler();
                let mut messages = std::mem::take(&mut self.inner.borrow_mut().messages);
                let handled = handler(&mut messages, err);
                self.inner.borrow_mut().messages = messages;
                match handled {
                    Ok(()) => Ok(T::default()),
                    Err(err) => {
                        tracing::warn!(error = %err, "connection error");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Runs `f` against the native connection unless another cursor holds
    /// pending results. `owner` is the calling cursor, if any.
    pub(crate) fn on_native<T, F>(&self, owner: Option<u64>, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn NativeConn) -> std::result::Result<T, MySqlError>,
    {
        let mut inner = self.inner.borrow_mut();
        match inner.busy {
            Some(id) if Some(id) != owner => return Err(Error::commands_out_of_sync()),
            _ => (),
        }
        Ok(f(inner.native()?)?)
    }

    /// Sends one statement.
    pub(crate) fn send(&self, owner: Option<u64>, statement: &[u8]) -> Result<()> {
        tracing::trace!(sql = %String::from_utf8_lossy(statement), "query");
        self.on_native(owner, |native| native.query(statement))
    }

    /// Sends a statement and discards all of its results.
    pub(crate) fn run(&self, statement: &[u8]) -> Result<()> {
        self.send(None, statement)?;
        self.on_native(None, |native| {
            loop {
                native.store_result()?;
                if !native.next_result()? {
                    return Ok(());
                }
            }
        })
    }

    pub(crate) fn fetch_warnings(&self) -> Result<Vec<Warning>> {
        if self.server_version() < MIN_CHARSET_VERSION {
            return Ok(Vec::new());
        }
        self.send(None, b"SHOW WARNINGS")?;
        let stored = self.on_native(None, |native| {
            let stored = native.store_result()?;
            while native.next_result()? {
                native.store_result()?;
            }
            Ok(stored)
        })?;
        let rows = stored.map(|stored| stored.rows).unwrap_or_default();
        Ok(rows.into_iter().map(warning_from_row).collect())
    }

    /// Marks `owner` as holding (or no longer holding) pending results.
    pub(crate) fn set_busy(&self, owner: u64, holds: bool) {
        let mut inner = self.inner.borrow_mut();
        if holds {
            inner.busy = Some(owner);
        } else if inner.busy == Some(owner) {
            inner.busy = None;
        }
    }

    pub(crate) fn is_busy_with(&self, owner: u64) -> bool {
        self.inner.borrow().busy == Some(owner)
    }

    /// Runs `f` with an encoding context bound to the session escaper.
    pub(crate) fn with_encoder<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&EncodeContext<'_>) -> std::result::Result<T, BindError>,
    {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        let native: &dyn NativeConn = match inner.native {
            Some(ref native) => native.as_ref(),
            None => return Err(InterfaceError::ConnectionClosed.into()),
        };
        let escape = |raw: &[u8]| native.escape_string(raw);
        let escaper = Escaper::new(&escape, inner.charset)
            .with_binary_prefix(inner.binary_prefix)
            .with_binary_safe(native.binary_safe());
        let ctx = EncodeContext::new(&inner.encoders, &escaper);
        Ok(f(&ctx)?)
    }

    pub(crate) fn bind(&self, template: &[u8], params: &Params) -> Result<Vec<u8>> {
        self.with_encoder(|ctx| bind::bind(template, params, ctx))
    }

    pub(crate) fn rewrite_for_many(&self, template: &[u8], rows: &[Params]) -> Result<Option<Vec<u8>>> {
        self.with_encoder(|ctx| rewrite::rewrite_for_many(template, rows, ctx))
    }

    pub(crate) fn decode_rows(&self, fields: &[Field], rows: Vec<RawRow>) -> Result<Vec<Vec<Value>>> {
        let inner = self.inner.borrow();
        rows.into_iter()
            .map(|row| {
                row.iter()
                    .zip(fields)
                    .map(|(raw, field)| {
                        inner
                            .decoders
                            .decode(raw.as_deref(), field, inner.charset)
                            .map_err(Error::from)
                    })
                    .collect()
            })
            .collect()
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if let Some(mut native) = self.inner.get_mut().native.take() {
            native.close();
        }
    }
}

const TEXT_COLUMN_TYPES: [ColumnType; 7] = [
    ColumnType::MYSQL_TYPE_STRING,
    ColumnType::MYSQL_TYPE_VAR_STRING,
    ColumnType::MYSQL_TYPE_VARCHAR,
    ColumnType::MYSQL_TYPE_TINY_BLOB,
    ColumnType::MYSQL_TYPE_MEDIUM_BLOB,
    ColumnType::MYSQL_TYPE_LONG_BLOB,
    ColumnType::MYSQL_TYPE_BLOB,
];

fn warning_from_row(row: RawRow) -> Warning {
    let text = |i: usize| {
        row.get(i)
            .and_then(Option::as_ref)
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .unwrap_or_default()
    };
    Warning {
        level: text(0),
        code: text(1).trim().parse().unwrap_or(0),
        message: text(2),
    }
}
