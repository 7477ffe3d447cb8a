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

// Merged view over an ordered stack of reftables. Sub-cursors feed a
// small vector-backed min-heap keyed by (current key, reader index
// descending), so on key ties the newest table's record surfaces first
// and shadowed duplicates are drained without being emitted. Tombstones
// hide older definitions and are themselves hidden unless deletions are
// requested.

use crate::error::{Error, Result};
use crate::reader::{Reader, TableLogCursor, TableRefCursor};
use crate::record::{LogRecord, RefRecord};
use crate::source::BlockSource;
use crate::{LogCursor, RefCursor};

/// Stack of readers, oldest first. The merged view borrows the readers;
/// dropping it releases only its own cursors.
pub struct MergedReftable<'a, S: BlockSource> {
	readers: Vec<&'a Reader<S>>,
	include_deletes: bool,
}

impl<'a, S: BlockSource> MergedReftable<'a, S> {
	pub fn new(readers: Vec<&'a Reader<S>>) -> MergedReftable<'a, S> {
		MergedReftable { readers, include_deletes: false }
	}

	pub fn set_include_deletes(&mut self, include: bool) {
		self.include_deletes = include;
	}

	pub fn table_count(&self) -> usize {
		self.readers.len()
	}

	pub fn all_refs(&self) -> Result<MergedRefCursor<'a, S>> {
		let mut subs = Vec::with_capacity(self.readers.len());
		for reader in &self.readers {
			subs.push(RefSub { cursor: reader.all_refs_with(true), pending: None });
		}
		let mut merged = MergedRefCursor {
			subs,
			heap: Vec::new(),
			include_deletes: self.include_deletes,
			closed: false,
		};
		merged.prime()?;
		Ok(merged)
	}

	pub fn seek_ref(&self, name: &str) -> Result<MergedRefCursor<'a, S>> {
		let mut cursor = self.all_refs()?;
		cursor.seek(name)?;
		Ok(cursor)
	}

	pub fn all_logs(&self) -> Result<MergedLogCursor<'a, S>> {
		let mut subs = Vec::with_capacity(self.readers.len());
		for reader in &self.readers {
			subs.push(LogSub { cursor: reader.all_logs(), pending: None });
		}
		let mut merged = MergedLogCursor { subs, heap: Vec::new(), closed: false };
		merged.prime()?;
		Ok(merged)
	}

	pub fn seek_log(&self, name: &str, time: u32) -> Result<MergedLogCursor<'a, S>> {
		let mut cursor = self.all_logs()?;
		LogCursor::seek(&mut cursor, name, time)?;
		Ok(cursor)
	}
}

struct RefSub<'a, S: BlockSource> {
	cursor: TableRefCursor<'a, S>,
	pending: Option<RefRecord>,
}

/// Merged ref iteration; for each name the record of the newest table
/// defining it wins.
pub struct MergedRefCursor<'a, S: BlockSource> {
	subs: Vec<RefSub<'a, S>>,
	/// Indices of subs with a pending record, heap-ordered.
	heap: Vec<usize>,
	include_deletes: bool,
	closed: bool,
}

impl<'a, S: BlockSource> MergedRefCursor<'a, S> {
	fn prime(&mut self) -> Result<()> {
		self.heap.clear();
		for i in 0..self.subs.len() {
			self.fill(i)?;
			if self.subs[i].pending.is_some() {
				self.heap.push(i);
				self.sift_up(self.heap.len() - 1);
			}
		}
		Ok(())
	}

	fn fill(&mut self, i: usize) -> Result<()> {
		match self.subs[i].cursor.next() {
			Ok(rec) => {
				self.subs[i].pending = rec;
				Ok(())
			}
			Err(e) => {
				self.closed = true;
				Err(Error::MergeSourceFailed(i, Box::new(e)))
			}
		}
	}

	/// (key asc, reader index desc): the newest definition of a name is
	/// always at the heap root.
	fn before(&self, a: usize, b: usize) -> bool {
		let ka = self.subs[a].pending.as_ref().map(|r| r.name().as_bytes());
		let kb = self.subs[b].pending.as_ref().map(|r| r.name().as_bytes());
		match (ka, kb) {
			(Some(ka), Some(kb)) => ka < kb || (ka == kb && a > b),
			_ => false,
		}
	}

	fn sift_up(&mut self, mut at: usize) {
		while at > 0 {
			let parent = (at - 1) / 2;
			if self.before(self.heap[at], self.heap[parent]) {
				self.heap.swap(at, parent);
				at = parent;
			} else {
				break;
			}
		}
	}

	fn sift_down(&mut self, mut at: usize) {
		loop {
			let left = 2 * at + 1;
			if left >= self.heap.len() {
				break;
			}
			let right = left + 1;
			let mut best = left;
			if right < self.heap.len() && self.before(self.heap[right], self.heap[left]) {
				best = right;
			}
			if self.before(self.heap[best], self.heap[at]) {
				self.heap.swap(at, best);
				at = best;
			} else {
				break;
			}
		}
	}

	/// After refilling the root sub-cursor `i`, restores heap order,
	/// removing the root when its table is exhausted.
	fn drop_root_if_empty(&mut self, i: usize) {
		if self.subs[i].pending.is_none() {
			let last = self.heap.len() - 1;
			self.heap.swap(0, last);
			self.heap.pop();
		}
		if !self.heap.is_empty() {
			self.sift_down(0);
		}
	}
}

impl<'a, S: BlockSource> RefCursor for MergedRefCursor<'a, S> {
	fn next(&mut self) -> Result<Option<RefRecord>> {
		if self.closed {
			return Err(Error::Closed);
		}
		loop {
			let top = match self.heap.first() {
				Some(&i) => i,
				None => return Ok(None),
			};
			let rec = self.subs[top].pending.take().unwrap();
			self.fill(top)?;
			self.drop_root_if_empty(top);
			// Older tables repeating the name are shadowed; consume
			// them without emitting.
			while let Some(&i) = self.heap.first() {
				let shadowed = self.subs[i]
					.pending
					.as_ref()
					.map_or(false, |r| r.name() == rec.name());
				if !shadowed {
					break;
				}
				self.fill(i)?;
				self.drop_root_if_empty(i);
			}
			if rec.is_deletion() && !self.include_deletes {
				continue;
			}
			return Ok(Some(rec));
		}
	}

	fn seek(&mut self, name: &str) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		for i in 0..self.subs.len() {
			self.subs[i]
				.cursor
				.seek(name)
				.map_err(|e| Error::MergeSourceFailed(i, Box::new(e)))?;
			self.subs[i].pending = None;
		}
		self.prime()
	}

	fn close(&mut self) {
		self.closed = true;
		self.heap.clear();
		for sub in &mut self.subs {
			sub.cursor.close();
			sub.pending = None;
		}
	}
}

struct LogSub<'a, S: BlockSource> {
	cursor: TableLogCursor<'a, S>,
	pending: Option<LogRecord>,
}

/// Merged log iteration over composite (name, reversed time) keys; the
/// reverse-time component makes newer entries surface first within a
/// ref, and identical keys resolve to the newest table.
pub struct MergedLogCursor<'a, S: BlockSource> {
	subs: Vec<LogSub<'a, S>>,
	heap: Vec<usize>,
	closed: bool,
}

impl<'a, S: BlockSource> MergedLogCursor<'a, S> {
	fn prime(&mut self) -> Result<()> {
		self.heap.clear();
		for i in 0..self.subs.len() {
			self.fill(i)?;
			if self.subs[i].pending.is_some() {
				self.heap.push(i);
				self.sift_up(self.heap.len() - 1);
			}
		}
		Ok(())
	}

	fn fill(&mut self, i: usize) -> Result<()> {
		match self.subs[i].cursor.next() {
			Ok(rec) => {
				self.subs[i].pending = rec;
				Ok(())
			}
			Err(e) => {
				self.closed = true;
				Err(Error::MergeSourceFailed(i, Box::new(e)))
			}
		}
	}

	fn key(&self, i: usize) -> Option<Vec<u8>> {
		self.subs[i].pending.as_ref().map(|r| r.key())
	}

	fn before(&self, a: usize, b: usize) -> bool {
		match (self.key(a), self.key(b)) {
			(Some(ka), Some(kb)) => ka < kb || (ka == kb && a > b),
			_ => false,
		}
	}

	fn sift_up(&mut self, mut at: usize) {
		while at > 0 {
			let parent = (at - 1) / 2;
			if self.before(self.heap[at], self.heap[parent]) {
				self.heap.swap(at, parent);
				at = parent;
			} else {
				break;
			}
		}
	}

	fn sift_down(&mut self, mut at: usize) {
		loop {
			let left = 2 * at + 1;
			if left >= self.heap.len() {
				break;
			}
			let right = left + 1;
			let mut best = left;
			if right < self.heap.len() && self.before(self.heap[right], self.heap[left]) {
				best = right;
			}
			if self.before(self.heap[best], self.heap[at]) {
				self.heap.swap(at, best);
				at = best;
			} else {
				break;
			}
		}
	}

	fn drop_root_if_empty(&mut self, i: usize) {
		if self.subs[i].pending.is_none() {
			let last = self.heap.len() - 1;
			self.heap.swap(0, last);
			self.heap.pop();
		}
		if !self.heap.is_empty() {
			self.sift_down(0);
		}
	}
}

impl<'a, S: BlockSource> LogCursor for MergedLogCursor<'a, S> {
	fn next(&mut self) -> Result<Option<LogRecord>> {
		if self.closed {
			return Err(Error::Closed);
		}
		let top = match self.heap.first() {
			Some(&i) => i,
			None => return Ok(None),
		};
		let rec = self.subs[top].pending.take().unwrap();
		let key = rec.key();
		self.fill(top)?;
		self.drop_root_if_empty(top);
		while let Some(&i) = self.heap.first() {
			let shadowed = self.key(i).map_or(false, |k| k == key);
			if !shadowed {
				break;
			}
			self.fill(i)?;
			self.drop_root_if_empty(i);
		}
		Ok(Some(rec))
	}

	fn seek(&mut self, name: &str, time: u32) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		for i in 0..self.subs.len() {
			LogCursor::seek(&mut self.subs[i].cursor, name, time)
				.map_err(|e| Error::MergeSourceFailed(i, Box::new(e)))?;
			self.subs[i].pending = None;
		}
		self.prime()
	}

	fn close(&mut self) {
		self.closed = true;
		self.heap.clear();
		for sub in &mut self.subs {
			sub.cursor.close();
			sub.pending = None;
		}
	}
}
