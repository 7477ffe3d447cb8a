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

use std::io::Write;

use crate::block::{BlockWriter, INDEX_BLOCK};
use crate::codec::put_varint;
use crate::error::Result;
use crate::stream::OutputStream;

/// Result of writing one section's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
	/// File position of the top-level index block.
	pub position: u64,
	pub levels: u32,
	pub keys: u32,
	pub bytes: u64,
}

/// Collects `(last key, block position)` pairs for the finalized blocks
/// of one section and emits the section index, stacking levels until
/// the top level is a single block.
pub struct IndexBuilder {
	entries: Vec<(Vec<u8>, u64)>,
}

impl IndexBuilder {
	pub fn new() -> IndexBuilder {
		IndexBuilder { entries: Vec::new() }
	}

	pub fn add(&mut self, last_key: &[u8], position: u64) {
		self.entries.push((last_key.to_vec(), position));
	}

	/// Writes the index unless the section has `threshold` blocks or
	/// fewer, in which case readers probe blocks directly and no index
	/// is worth its bytes.
	pub fn write<W: Write>(
		&self,
		os: &mut OutputStream<W>,
		block_size: u32,
		restart_interval: u16,
		threshold: usize,
	) -> Result<Option<IndexInfo>> {
		if self.entries.len() <= threshold {
			return Ok(None);
		}
		let keys = self.entries.len() as u32;
		let start = os.offset();
		let mut level = self.entries.clone();
		let mut levels = 0u32;
		loop {
			let mut next: Vec<(Vec<u8>, u64)> = Vec::new();
			let mut bw = BlockWriter::new(INDEX_BLOCK, block_size, 0, restart_interval);
			let mut value = Vec::new();
			for (key, position) in &level {
				value.clear();
				put_varint(&mut value, *position);
				if !bw.try_add(key, 0, &value)? {
					let flushed_last = bw.last_key().to_vec();
					let at = bw.write_to(os)?;
					next.push((flushed_last, at));
					bw = BlockWriter::new(INDEX_BLOCK, block_size, 0, restart_interval);
					// An index block takes a lone oversized entry.
					let added = bw.try_add(key, 0, &value)?;
					debug_assert!(added);
				}
			}
			let last = bw.last_key().to_vec();
			let at = bw.write_to(os)?;
			next.push((last, at));
			levels += 1;
			if next.len() == 1 {
				let (_, position) = next[0];
				return Ok(Some(IndexInfo {
					position,
					levels,
					keys,
					bytes: os.offset() - start,
				}));
			}
			level = next;
		}
	}
}
