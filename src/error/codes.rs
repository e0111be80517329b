// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Server (`ER_*`) and client library (`CR_*`) error codes that take part in
//! error classification.

use super::DatabaseErrorKind;

pub const ER_DB_CREATE_EXISTS: u16 = 1007;
pub const ER_BAD_NULL_ERROR: u16 = 1048;
pub const ER_BAD_FIELD_ERROR: u16 = 1054;
pub const ER_DUP_ENTRY: u16 = 1062;
pub const ER_PARSE_ERROR: u16 = 1064;
pub const ER_WRONG_DB_NAME: u16 = 1102;
pub const ER_WRONG_TABLE_NAME: u16 = 1103;
pub const ER_FIELD_SPECIFIED_TWICE: u16 = 1110;
pub const ER_INVALID_GROUP_FUNC_USE: u16 = 1111;
pub const ER_UNSUPPORTED_EXTENSION: u16 = 1112;
pub const ER_TABLE_MUST_HAVE_COLUMNS: u16 = 1113;
pub const ER_NO_SUCH_TABLE: u16 = 1146;
pub const ER_SYNTAX_ERROR: u16 = 1149;
pub const ER_DUP_UNIQUE: u16 = 1169;
pub const ER_PRIMARY_CANT_HAVE_NULL: u16 = 1171;
pub const ER_CANT_DO_THIS_DURING_AN_TRANSACTION: u16 = 1179;
pub const ER_WARNING_NOT_COMPLETE_ROLLBACK: u16 = 1196;
pub const ER_NO_REFERENCED_ROW: u16 = 1216;
pub const ER_ROW_IS_REFERENCED: u16 = 1217;
pub const ER_NOT_SUPPORTED_YET: u16 = 1235;
pub const ER_WARN_DATA_OUT_OF_RANGE: u16 = 1264;
pub const WARN_DATA_TRUNCATED: u16 = 1265;
pub const ER_UNKNOWN_STORAGE_ENGINE: u16 = 1286;
pub const ER_FEATURE_DISABLED: u16 = 1289;
pub const ER_TRUNCATED_WRONG_VALUE: u16 = 1292;
pub const ER_DIVISION_BY_ZERO: u16 = 1365;
pub const ER_TRUNCATED_WRONG_VALUE_FOR_FIELD: u16 = 1366;
pub const ER_DATA_TOO_LONG: u16 = 1406;
pub const ER_CANT_CREATE_GEOMETRY_OBJECT: u16 = 1416;
pub const ER_ROW_IS_REFERENCED_2: u16 = 1451;
pub const ER_NO_REFERENCED_ROW_2: u16 = 1452;

pub const CR_UNKNOWN_ERROR: u16 = 2000;
pub const CR_CONNECTION_ERROR: u16 = 2002;
pub const CR_CONN_HOST_ERROR: u16 = 2003;
pub const CR_SERVER_GONE_ERROR: u16 = 2006;
pub const CR_SERVER_LOST: u16 = 2013;
pub const CR_COMMANDS_OUT_OF_SYNC: u16 = 2014;
pub const CR_SERVER_LOST_EXTENDED: u16 = 2055;
pub const CR_MAX_ERROR: u16 = 2999;

/// Codes after which the session is gone and only a new connection helps.
pub const CONNECTIVITY_ERRORS: &[u16] = &[
    CR_CONNECTION_ERROR,
    CR_CONN_HOST_ERROR,
    CR_SERVER_GONE_ERROR,
    CR_SERVER_LOST,
    CR_SERVER_LOST_EXTENDED,
];

/// Maps a nonzero code not above `CR_MAX_ERROR` to its error class.
pub fn classify(code: u16) -> DatabaseErrorKind {
    match code {
        ER_DB_CREATE_EXISTS
        | ER_PARSE_ERROR
        | ER_NO_SUCH_TABLE
        | ER_SYNTAX_ERROR
        | ER_BAD_FIELD_ERROR
        | ER_WRONG_DB_NAME
        | ER_WRONG_TABLE_NAME
        | ER_FIELD_SPECIFIED_TWICE
        | ER_INVALID_GROUP_FUNC_USE
        | ER_UNSUPPORTED_EXTENSION
        | ER_TABLE_MUST_HAVE_COLUMNS
        | ER_CANT_DO_THIS_DURING_AN_TRANSACTION => DatabaseErrorKind::Programming,
        ER_DUP_ENTRY
        | ER_DUP_UNIQUE
        | ER_PRIMARY_CANT_HAVE_NULL
        | ER_BAD_NULL_ERROR
        | ER_NO_REFERENCED_ROW
        | ER_ROW_IS_REFERENCED
        | ER_ROW_IS_REFERENCED_2
        | ER_NO_REFERENCED_ROW_2 => DatabaseErrorKind::Integrity,
        ER_WARN_DATA_OUT_OF_RANGE
        | WARN_DATA_TRUNCATED
        | ER_TRUNCATED_WRONG_VALUE
        | ER_DIVISION_BY_ZERO
        | ER_TRUNCATED_WRONG_VALUE_FOR_FIELD
        | ER_DATA_TOO_LONG
        | ER_CANT_CREATE_GEOMETRY_OBJECT => DatabaseErrorKind::Data,
        ER_WARNING_NOT_COMPLETE_ROLLBACK
        | ER_NOT_SUPPORTED_YET
        | ER_UNKNOWN_STORAGE_ENGINE
        | ER_FEATURE_DISABLED => DatabaseErrorKind::NotSupported,
        CR_COMMANDS_OUT_OF_SYNC => DatabaseErrorKind::Internal,
        x if x < 1000 => DatabaseErrorKind::Internal,
        _ => DatabaseErrorKind::Operational,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_classify_server_codes() {
        assert_eq!(classify(ER_PARSE_ERROR), DatabaseErrorKind::Programming);
        assert_eq!(classify(ER_NO_SUCH_TABLE), DatabaseErrorKind::Programming);
        assert_eq!(classify(ER_DUP_ENTRY), DatabaseErrorKind::Integrity);
        assert_eq!(classify(ER_BAD_NULL_ERROR), DatabaseErrorKind::Integrity);
        assert_eq!(classify(ER_DATA_TOO_LONG), DatabaseErrorKind::Data);
        assert_eq!(
            classify(ER_WARNING_NOT_COMPLETE_ROLLBACK),
            DatabaseErrorKind::NotSupported
        );
        assert_eq!(classify(CR_COMMANDS_OUT_OF_SYNC), DatabaseErrorKind::Internal);
        assert_eq!(classify(999), DatabaseErrorKind::Internal);
        assert_eq!(classify(CR_SERVER_GONE_ERROR), DatabaseErrorKind::Operational);
        assert_eq!(classify(1045), DatabaseErrorKind::Operational);
    }
}
