// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use url::ParseError;

use std::{error, fmt, result};

pub mod codes;

/// Error reported by the native client layer (server error packet or client library failure).
#[derive(Eq, PartialEq, Clone)]
pub struct MySqlError {
    pub state: String,
    pub message: String,
    pub code: u16,
}

impl MySqlError {
    pub fn new<T: Into<String>>(code: u16, message: T) -> Self {
        MySqlError {
            state: String::from("HY000"),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {} ({}): {}", self.code, self.state, self.message)
    }
}

impl fmt::Debug for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for MySqlError {
    fn description(&self) -> &str {
        "Error returned by a server"
    }
}

/// Flattened error class, one per DB-API exception type.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum ErrorKind {
    Warning,
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

/// Subclass of a [`DatabaseError`].
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum DatabaseErrorKind {
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl DatabaseErrorKind {
    fn name(self) -> &'static str {
        match self {
            DatabaseErrorKind::Database => "DatabaseError",
            DatabaseErrorKind::Data => "DataError",
            DatabaseErrorKind::Operational => "OperationalError",
            DatabaseErrorKind::Integrity => "IntegrityError",
            DatabaseErrorKind::Internal => "InternalError",
            DatabaseErrorKind::Programming => "ProgrammingError",
            DatabaseErrorKind::NotSupported => "NotSupportedError",
        }
    }
}

#[derive(Eq, PartialEq, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    /// `None` for errors raised by this library rather than the server or client library.
    pub code: Option<u16>,
    pub state: Option<String>,
    pub message: String,
}

impl DatabaseError {
    pub fn new<T: Into<String>>(kind: DatabaseErrorKind, message: T) -> Self {
        DatabaseError {
            kind,
            code: None,
            state: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({}): {}", self.kind.name(), code, self.message),
            None => write!(f, "{}: {}", self.kind.name(), self.message),
        }
    }
}

impl fmt::Debug for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for DatabaseError {
    fn description(&self) -> &str {
        "Database error"
    }
}

/// Misuse of the client interface itself.
#[derive(Eq, PartialEq, Clone)]
pub enum InterfaceError {
    ConnectionClosed,
    CursorClosed,
    /// The native layer failed without a usable error code.
    Native(MySqlError),
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InterfaceError::ConnectionClosed => write!(f, "connection closed"),
            InterfaceError::CursorClosed => write!(f, "cursor closed"),
            InterfaceError::Native(ref err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Debug for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for InterfaceError {
    fn description(&self) -> &str {
        "Interface error"
    }
}

/// Row of `SHOW WARNINGS`.
#[derive(Eq, PartialEq, Clone)]
pub struct Warning {
    pub level: String,
    pub code: u16,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.level, self.code, self.message)
    }
}

impl fmt::Debug for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A value could not be turned into a literal.
#[derive(Eq, PartialEq, Clone)]
pub enum EncodeError {
    /// Text contains a character the connection charset cannot represent.
    Charset { charset: String, ch: char },
    /// Value has no SQL representation (e.g. NaN).
    Unrepresentable(String),
    /// Failure reported by an application-registered encoder.
    Custom(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EncodeError::Charset { ref charset, ch } => {
                write!(f, "character {:?} can not be encoded in `{}'", ch, charset)
            }
            EncodeError::Unrepresentable(ref what) => {
                write!(f, "value `{}' has no SQL representation", what)
            }
            EncodeError::Custom(ref msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for EncodeError {
    fn description(&self) -> &str {
        "Value encoding error"
    }
}

/// A column value could not be converted from its wire representation.
#[derive(Eq, PartialEq, Clone)]
pub struct DecodeError {
    pub column: String,
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not decode value of column `{}': {}",
            self.column, self.message
        )
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for DecodeError {
    fn description(&self) -> &str {
        "Value decoding error"
    }
}

/// Failure to substitute parameters into a statement template.
#[derive(Eq, PartialEq, Clone)]
pub enum BindError {
    /// Number of `%s` placeholders differs from the number of supplied values.
    ArityMismatch { placeholders: usize, supplied: usize },
    MissingNamedParameter(String),
    /// Named placeholder with positional params or vice versa.
    WrongParamsKind,
    /// `%` at this byte offset is neither `%%`, `%s` nor `%(name)s`.
    BadPlaceholder(usize),
    EncodingFailure(EncodeError),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BindError::ArityMismatch {
                placeholders,
                supplied,
            } if placeholders > supplied => write!(
                f,
                "not enough arguments for format string ({} placeholders, {} values)",
                placeholders, supplied
            ),
            BindError::ArityMismatch {
                placeholders,
                supplied,
            } => write!(
                f,
                "not all arguments converted ({} placeholders, {} values)",
                placeholders, supplied
            ),
            BindError::MissingNamedParameter(ref name) => {
                write!(f, "Missing named parameter `{}' for statement", name)
            }
            BindError::WrongParamsKind => write!(
                f,
                "Placeholder style does not match the kind of supplied parameters"
            ),
            BindError::BadPlaceholder(offset) => {
                write!(f, "Unsupported format character at offset {}", offset)
            }
            BindError::EncodingFailure(ref err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Debug for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for BindError {
    fn description(&self) -> &str {
        "Parameter binding error"
    }
}

impl From<EncodeError> for BindError {
    fn from(err: EncodeError) -> BindError {
        BindError::EncodingFailure(err)
    }
}

#[derive(Eq, PartialEq, Clone)]
pub enum Error {
    InterfaceError(InterfaceError),
    DatabaseError(DatabaseError),
    BindError(BindError),
    /// Server warning escalated to an error.
    Warning(Warning),
    UrlError(UrlError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::InterfaceError(_) | Error::UrlError(_) => ErrorKind::Interface,
            Error::Warning(_) => ErrorKind::Warning,
            Error::BindError(_) => ErrorKind::Programming,
            Error::DatabaseError(ref err) => match err.kind {
                DatabaseErrorKind::Database => ErrorKind::Database,
                DatabaseErrorKind::Data => ErrorKind::Data,
                DatabaseErrorKind::Operational => ErrorKind::Operational,
                DatabaseErrorKind::Integrity => ErrorKind::Integrity,
                DatabaseErrorKind::Internal => ErrorKind::Internal,
                DatabaseErrorKind::Programming => ErrorKind::Programming,
                DatabaseErrorKind::NotSupported => ErrorKind::NotSupported,
            },
        }
    }

    /// `true` for `DatabaseError` and all of its subclasses.
    pub fn is_database_error(&self) -> bool {
        matches!(*self, Error::DatabaseError(_) | Error::BindError(_))
    }

    /// Server or client library error code, if any.
    pub fn code(&self) -> Option<u16> {
        match *self {
            Error::DatabaseError(ref err) => err.code,
            Error::InterfaceError(InterfaceError::Native(ref err)) => Some(err.code),
            Error::Warning(ref warning) => Some(warning.code),
            _ => None,
        }
    }

    /// The session is gone; the caller has to reconnect before retrying.
    pub fn is_connectivity_error(&self) -> bool {
        match *self {
            Error::DatabaseError(DatabaseError {
                code: Some(code), ..
            }) => codes::CONNECTIVITY_ERRORS.contains(&code),
            Error::InterfaceError(InterfaceError::ConnectionClosed) => true,
            _ => false,
        }
    }

    pub(crate) fn programming<T: Into<String>>(message: T) -> Self {
        Error::DatabaseError(DatabaseError::new(DatabaseErrorKind::Programming, message))
    }

    pub(crate) fn not_supported<T: Into<String>>(message: T) -> Self {
        Error::DatabaseError(DatabaseError::new(
            DatabaseErrorKind::NotSupported,
            message,
        ))
    }

    pub(crate) fn commands_out_of_sync() -> Self {
        Error::from(MySqlError::new(
            codes::CR_COMMANDS_OUT_OF_SYNC,
            "Commands out of sync; you can't run this command now",
        ))
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match *self {
            Error::InterfaceError(ref err) => Some(err),
            Error::DatabaseError(ref err) => Some(err),
            Error::BindError(ref err) => Some(err),
            Error::UrlError(ref err) => Some(err),
            Error::Warning(_) => None,
        }
    }
}

impl From<MySqlError> for Error {
    fn from(err: MySqlError) -> Error {
        if err.code == 0 || err.code > codes::CR_MAX_ERROR {
            return Error::InterfaceError(InterfaceError::Native(err));
        }
        Error::DatabaseError(DatabaseError {
            kind: codes::classify(err.code),
            code: Some(err.code),
            state: Some(err.state),
            message: err.message,
        })
    }
}

impl From<InterfaceError> for Error {
    fn from(err: InterfaceError) -> Error {
        Error::InterfaceError(err)
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Error {
        Error::DatabaseError(err)
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Error {
        Error::BindError(err)
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Error {
        Error::BindError(BindError::EncodingFailure(err))
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::DatabaseError(DatabaseError::new(
            DatabaseErrorKind::Data,
            err.to_string(),
        ))
    }
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Error {
        Error::UrlError(err)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InterfaceError(ref err) => write!(f, "InterfaceError {{ {} }}", err),
            Error::DatabaseError(ref err) => write!(f, "{}", err),
            Error::BindError(ref err) => write!(f, "ProgrammingError: {}", err),
            Error::Warning(ref warning) => write!(f, "Warning {{ {} }}", warning),
            Error::UrlError(ref err) => write!(f, "UrlError {{ {} }}", err),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Eq, PartialEq, Clone)]
pub enum UrlError {
    ParseError(ParseError),
    UnsupportedScheme(String),
    InvalidValue(String, String),
    UnknownParameter(String),
    BadUrl,
}

impl error::Error for UrlError {
    fn description(&self) -> &str {
        "Database connection URL error"
    }
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            UrlError::ParseError(ref err) => write!(f, "URL ParseError {{ {} }}", err),
            UrlError::UnsupportedScheme(ref s) => write!(f, "URL scheme `{}' is not supported", s),
            UrlError::InvalidValue(ref parameter, ref value) => write!(
                f,
                "Invalid value `{}' for URL parameter `{}'",
                value, parameter
            ),
            UrlError::UnknownParameter(ref parameter) => {
                write!(f, "Unknown URL parameter `{}'", parameter)
            }
            UrlError::BadUrl => write!(f, "Invalid or incomplete connection URL"),
        }
    }
}

impl fmt::Debug for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<ParseError> for UrlError {
    fn from(x: ParseError) -> UrlError {
        UrlError::ParseError(x)
    }
}

pub type Result<T> = result::Result<T, Error>;
