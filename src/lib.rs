// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

// Reftable: a block-structured, immutable, append-only file format for
// the reference namespace of a Git repository. A table stores refs,
// symbolic refs and reflogs; a stack of tables plus a merged view forms
// the logical ref database, newest table winning on key collisions.

mod block;
mod codec;
mod display;
mod error;
mod index;
mod merge;
mod options;
mod reader;
mod record;
mod source;
mod stack;
mod stream;
mod writer;

pub use error::{Error, Result};
pub use merge::{MergedLogCursor, MergedRefCursor, MergedReftable};
pub use options::{WriterOptions, DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_INTERVAL, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use reader::{Reader, TableLogCursor, TableRefCursor};
pub use record::{
	is_valid_ref_name, log_key, reverse_time, LogRecord, ObjectId, RefRecord, OBJECT_ID_LEN,
	ZERO_ID,
};
pub use source::{BlockSource, FileSource, MemSource};
pub use stack::Stack;
pub use writer::{Writer, WriterStats};

use record::{LogRecord as Log, RefRecord as Ref};

/// Iteration over ref records in increasing name order. Returned
/// records are owned copies; `next` after `close` fails with `Closed`.
pub trait RefCursor {
	fn next(&mut self) -> Result<Option<Ref>>;
	/// Re-positions at the least record whose name is >= `name`.
	fn seek(&mut self, name: &str) -> Result<()>;
	fn close(&mut self);
}

/// Iteration over log records, grouped by ref and newest-first within
/// a ref.
pub trait LogCursor {
	fn next(&mut self) -> Result<Option<Log>>;
	/// Re-positions at the newest record of `name` at or before `time`.
	fn seek(&mut self, name: &str, time: u32) -> Result<()>;
	fn close(&mut self);
}
