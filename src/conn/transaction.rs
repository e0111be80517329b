// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::Result;

use super::{cursor::Cursor, row::Tuple, Conn};

/// Open transaction, see [`Conn::start_transaction`].
///
/// Dropping it without `commit` rolls it back and swallows errors.
#[derive(Debug)]
pub struct Transaction<'a> {
    conn: &'a Conn,
    committed: bool,
    rolled_back: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(conn: &'a Conn) -> Transaction<'a> {
        Transaction {
            conn,
            committed: false,
            rolled_back: false,
        }
    }

    pub fn conn(&self) -> &'a Conn {
        self.conn
    }

    pub fn cursor(&self) -> Cursor<'a, Tuple> {
        self.conn.cursor()
    }

    /// Will consume and commit transaction.
    pub fn commit(mut self) -> Result<()> {
        self.conn.commit()?;
        self.committed = true;
        Ok(())
    }

    /// Will consume and rollback transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.conn.rollback()?;
        self.rolled_back = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed || self.rolled_back {
            return;
        }
        if self.conn.is_transactional() && !self.conn.is_closed() {
            tracing::debug!("rolling back unfinished transaction");
            let _ = self.conn.run(b"ROLLBACK");
        }
    }
}
