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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::block::{
	BlockCursor, BlockData, BlockEntry, BLOCK_HEADER_LEN, INDEX_BLOCK, LOG_BLOCK, OBJ_BLOCK,
	REF_BLOCK,
};
use crate::error::{Error, Result};
use crate::record::{log_key, LogRecord, ObjectId, RefRecord};
use crate::source::BlockSource;
use crate::writer::{FILE_FOOTER_LEN, FILE_HEADER_LEN, FILE_MAGIC, FOOTER_CRC_SPAN, VERSION_1};
use crate::{LogCursor, RefCursor};

/// Validated view over one immutable reftable. Cursors borrow the
/// reader; one reader serves any number of concurrent cursors.
pub struct Reader<S: BlockSource> {
	src: S,
	block_size: u32,
	min_update_index: u64,
	max_update_index: u64,
	ref_index_position: u64,
	obj_position: u64,
	obj_id_len: u32,
	obj_index_position: u64,
	log_position: u64,
	log_index_position: u64,
	refs_end: u64,
	objs_end: u64,
	logs_end: u64,
	include_deletes: bool,
	/// Index blocks are hot on every seek; parse them once.
	index_cache: RwLock<HashMap<u64, Arc<BlockData>>>,
}

fn be_u64(buf: &[u8]) -> u64 {
	let mut b = [0u8; 8];
	b.copy_from_slice(&buf[..8]);
	u64::from_be_bytes(b)
}

impl<S: BlockSource> Reader<S> {
	pub fn open(src: S) -> Result<Reader<S>> {
		let size = src.size();
		if size < (FILE_HEADER_LEN + FILE_FOOTER_LEN) as u64 {
			return Err(Error::MalformedHeader(format!("file too short: {} bytes", size)));
		}
		let header = src.read(0, FILE_HEADER_LEN)?;
		if header[0..4] != FILE_MAGIC {
			return Err(Error::MalformedHeader("bad magic".into()));
		}
		if header[4] != VERSION_1 {
			return Err(Error::MalformedHeader(format!("unsupported version {}", header[4])));
		}
		let block_size = u32::from_be_bytes([0, header[5], header[6], header[7]]);
		if block_size == 0 {
			return Err(Error::MalformedHeader("zero block size".into()));
		}
		let min_update_index = be_u64(&header[8..16]);
		let max_update_index = be_u64(&header[16..24]);

		let footer_start = size - FILE_FOOTER_LEN as u64;
		let footer = src.read(footer_start, FILE_FOOTER_LEN)?;
		if footer.len() < FILE_FOOTER_LEN {
			return Err(Error::MalformedFooter("truncated footer".into()));
		}
		if footer[0..4] != FILE_MAGIC {
			return Err(Error::MalformedFooter("bad magic".into()));
		}
		if footer[0..FILE_HEADER_LEN] != header[..] {
			return Err(Error::MalformedFooter("header copy differs".into()));
		}
		let mut hasher = crc32fast::Hasher::new();
		hasher.update(&footer[0..FOOTER_CRC_SPAN]);
		let actual = hasher.finalize();
		let stored = u32::from_be_bytes([footer[64], footer[65], footer[66], footer[67]]);
		if stored != actual {
			return Err(Error::MalformedFooter(format!(
				"CRC mismatch at {}: stored {:08x}, computed {:08x}",
				footer_start + FOOTER_CRC_SPAN as u64,
				stored,
				actual,
			)));
		}

		let ref_index_position = be_u64(&footer[24..32]);
		let obj_word = be_u64(&footer[32..40]);
		let obj_position = obj_word >> 5;
		let obj_id_len = (obj_word & 0x1f) as u32;
		let obj_index_position = be_u64(&footer[40..48]);
		let log_position = be_u64(&footer[48..56]);
		let log_index_position = be_u64(&footer[56..64]);
		for &p in &[
			ref_index_position,
			obj_position,
			obj_index_position,
			log_position,
			log_index_position,
		] {
			if p != 0 && p >= footer_start {
				return Err(Error::MalformedFooter(format!("section position {} out of range", p)));
			}
		}
		if obj_position != 0 && (obj_id_len == 0 || obj_id_len as usize > crate::record::OBJECT_ID_LEN) {
			return Err(Error::MalformedFooter(format!("bad object id length {}", obj_id_len)));
		}

		let refs_end = [ref_index_position, obj_position, log_position]
			.iter()
			.cloned()
			.find(|&p| p != 0)
			.unwrap_or(footer_start);
		let objs_end = [obj_index_position, log_position]
			.iter()
			.cloned()
			.find(|&p| p != 0)
			.unwrap_or(footer_start);
		let logs_end = if log_index_position != 0 { log_index_position } else { footer_start };

		log::debug!(
			target: "reftable",
			"Opened reftable: {} bytes, update indices {}..{}",
			size,
			min_update_index,
			max_update_index,
		);
		Ok(Reader {
			src,
			block_size,
			min_update_index,
			max_update_index,
			ref_index_position,
			obj_position,
			obj_id_len,
			obj_index_position,
			log_position,
			log_index_position,
			refs_end,
			objs_end,
			logs_end,
			include_deletes: false,
			index_cache: RwLock::new(HashMap::new()),
		})
	}

	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	pub fn min_update_index(&self) -> u64 {
		self.min_update_index
	}

	pub fn max_update_index(&self) -> u64 {
		self.max_update_index
	}

	pub fn size(&self) -> u64 {
		self.src.size()
	}

	pub fn has_objs(&self) -> bool {
		self.obj_position != 0
	}

	pub fn into_source(self) -> S {
		self.src
	}

	/// When set, type-0 tombstones are surfaced by cursors instead of
	/// being silently skipped. Applies to cursors created afterwards.
	pub fn set_include_deletes(&mut self, include: bool) {
		self.include_deletes = include;
	}

	pub fn include_deletes(&self) -> bool {
		self.include_deletes
	}

	fn read_block_at(&self, position: u64, expect: Option<u8>) -> Result<BlockData> {
		let want = std::cmp::max(self.block_size as usize, BLOCK_HEADER_LEN);
		let mut raw = self.src.read(position, want)?;
		if raw.len() < BLOCK_HEADER_LEN {
			return Err(Error::MalformedBlock {
				position,
				offset: 0,
				reason: "truncated block header".into(),
			});
		}
		let body_len = u32::from_be_bytes([0, raw[1], raw[2], raw[3]]) as usize;
		if body_len > raw.len() {
			let more = self.src.read(position + raw.len() as u64, body_len - raw.len())?;
			raw.extend_from_slice(&more);
			if raw.len() < body_len {
				return Err(Error::MalformedBlock {
					position,
					offset: 0,
					reason: "block extends past end of file".into(),
				});
			}
		}
		BlockData::parse(position, raw, expect)
	}

	fn read_shared_block(&self, position: u64) -> Result<Arc<BlockData>> {
		if let Some(block) = self.index_cache.read().get(&position) {
			return Ok(block.clone());
		}
		let block = Arc::new(self.read_block_at(position, None)?);
		if block.block_type() == INDEX_BLOCK {
			self.index_cache.write().insert(position, block.clone());
		}
		Ok(block)
	}

	/// Next data block at or after `candidate`, skipping alignment
	/// padding. `None` once the section is exhausted.
	fn load_data_block(&self, candidate: u64, end: u64, expect: u8) -> Result<Option<BlockData>> {
		let mut position = candidate;
		loop {
			if position >= end {
				return Ok(None);
			}
			let probe = std::cmp::min(self.block_size as u64, end - position) as usize;
			let chunk = self.src.read(position, probe)?;
			if chunk.is_empty() {
				return Ok(None);
			}
			if chunk[0] == expect {
				return Ok(Some(self.read_block_at(position, Some(expect))?));
			}
			if chunk[0] != 0 {
				return Err(Error::MalformedBlock {
					position,
					offset: 0,
					reason: "unexpected block type".into(),
				});
			}
			match chunk.iter().position(|&b| b != 0) {
				Some(i) => position += i as u64,
				None => position += chunk.len() as u64,
			}
		}
	}

	/// Walks the section index down to a positioned data-block cursor.
	/// `None` cursor means every key of the section is below the target.
	fn seek_via_index(
		&self,
		index_position: u64,
		key: &[u8],
		expect: u8,
		end: u64,
	) -> Result<(Option<BlockCursor>, u64)> {
		let mut position = index_position;
		loop {
			let block = self.read_shared_block(position)?;
			if block.block_type() == INDEX_BLOCK {
				let mut cursor = BlockCursor::new(block);
				cursor.seek(key)?;
				match cursor.next()? {
					Some(BlockEntry::Index { position: child, .. }) => position = child,
					None => return Ok((None, end)),
					Some(_) => {
						return Err(Error::MalformedBlock {
							position,
							offset: 0,
							reason: "non-index entry in index block".into(),
						})
					}
				}
			} else if block.block_type() == expect {
				let next = block.position() + block.body_len() as u64;
				let mut cursor = BlockCursor::new(block);
				cursor.seek(key)?;
				return Ok((Some(cursor), next));
			} else {
				return Err(Error::MalformedBlock {
					position,
					offset: 0,
					reason: "unexpected block type behind index".into(),
				});
			}
		}
	}

	/// Probes data blocks in file order, using each block's terminal key
	/// implicitly: a block whose in-block seek lands at the end holds
	/// only smaller keys, so the scan continues.
	fn seek_linear(
		&self,
		start: u64,
		end: u64,
		expect: u8,
		key: &[u8],
	) -> Result<(Option<BlockCursor>, u64)> {
		let mut position = start;
		loop {
			match self.load_data_block(position, end, expect)? {
				None => return Ok((None, end)),
				Some(block) => {
					let next = block.position() + block.body_len() as u64;
					let mut cursor = BlockCursor::new(Arc::new(block));
					cursor.seek(key)?;
					if !cursor.at_end() {
						return Ok((Some(cursor), next));
					}
					position = next;
				}
			}
		}
	}

	fn position_ref(&self, key: &[u8]) -> Result<(Option<BlockCursor>, u64)> {
		if self.ref_index_position != 0 {
			self.seek_via_index(self.ref_index_position, key, REF_BLOCK, self.refs_end)
		} else {
			self.seek_linear(FILE_HEADER_LEN as u64, self.refs_end, REF_BLOCK, key)
		}
	}

	fn position_log(&self, key: &[u8]) -> Result<(Option<BlockCursor>, u64)> {
		if self.log_position == 0 {
			return Ok((None, 0));
		}
		if self.log_index_position != 0 {
			self.seek_via_index(self.log_index_position, key, LOG_BLOCK, self.logs_end)
		} else {
			self.seek_linear(self.log_position, self.logs_end, LOG_BLOCK, key)
		}
	}

	/// Full scan over the ref section, least key first.
	pub fn all_refs(&self) -> TableRefCursor<S> {
		TableRefCursor {
			reader: self,
			cursor: None,
			next_position: FILE_HEADER_LEN as u64,
			end: self.refs_end,
			include_deletes: self.include_deletes,
			closed: false,
		}
	}

	pub fn seek_to_first_ref(&self) -> TableRefCursor<S> {
		self.all_refs()
	}

	/// Cursor positioned at the least ref whose name is >= `name`.
	pub fn seek_ref(&self, name: &str) -> Result<TableRefCursor<S>> {
		let (cursor, next_position) = self.position_ref(name.as_bytes())?;
		Ok(TableRefCursor {
			reader: self,
			cursor,
			next_position,
			end: self.refs_end,
			include_deletes: self.include_deletes,
			closed: false,
		})
	}

	pub(crate) fn all_refs_with(&self, include_deletes: bool) -> TableRefCursor<S> {
		let mut cursor = self.all_refs();
		cursor.include_deletes = include_deletes;
		cursor
	}

	pub fn has_ref(&self, name: &str) -> Result<bool> {
		let mut cursor = self.seek_ref(name)?;
		Ok(match cursor.next()? {
			Some(rec) => rec.name() == name,
			None => false,
		})
	}

	/// Full scan over the log section; entries group by ref and run
	/// newest-first within a ref.
	pub fn all_logs(&self) -> TableLogCursor<S> {
		TableLogCursor {
			reader: self,
			cursor: None,
			next_position: self.log_position,
			end: if self.log_position == 0 { 0 } else { self.logs_end },
			closed: false,
		}
	}

	/// Cursor positioned at the newest log entry of `name` whose time is
	/// at or before `time`.
	pub fn seek_log(&self, name: &str, time: u32) -> Result<TableLogCursor<S>> {
		let (cursor, next_position) = self.position_log(&log_key(name, time))?;
		Ok(TableLogCursor {
			reader: self,
			cursor,
			next_position,
			end: if self.log_position == 0 { 0 } else { self.logs_end },
			closed: false,
		})
	}

	/// Refs whose direct id equals `id`. Served by the object-id section
	/// when the table carries one, by a full scan otherwise.
	pub fn refs_by_object_id(&self, id: &ObjectId) -> Result<Vec<RefRecord>> {
		if self.obj_position == 0 {
			let mut out = Vec::new();
			let mut cursor = self.all_refs();
			while let Some(rec) = cursor.next()? {
				if rec.object_id() == Some(id) {
					out.push(rec);
				}
			}
			return Ok(out);
		}
		log::trace!(target: "reftable", "Object lookup {}", crate::display::hex(id));
		let prefix = &id[..self.obj_id_len as usize];
		let (cursor, _) = if self.obj_index_position != 0 {
			self.seek_via_index(self.obj_index_position, prefix, OBJ_BLOCK, self.objs_end)?
		} else {
			self.seek_linear(self.obj_position, self.objs_end, OBJ_BLOCK, prefix)?
		};
		let mut out = Vec::new();
		if let Some(mut cursor) = cursor {
			if let Some(BlockEntry::Obj { id_prefix, positions }) = cursor.next()? {
				if id_prefix == prefix {
					for position in positions {
						let block = self.read_block_at(position, Some(REF_BLOCK))?;
						let mut refs = BlockCursor::new(Arc::new(block));
						while let Some(BlockEntry::Ref(rec)) = refs.next()? {
							if rec.object_id() == Some(id) {
								out.push(rec);
							}
						}
					}
				}
			}
		}
		Ok(out)
	}

	/// Expected number of disk reads to resolve one ref: one per index
	/// level plus the data block with an index, half the section blocks
	/// without one.
	pub fn estimated_seeks_per_ref_read(&self) -> Result<u64> {
		if self.ref_index_position != 0 {
			let mut levels = 0u64;
			let mut position = self.ref_index_position;
			loop {
				let block = self.read_shared_block(position)?;
				if block.block_type() != INDEX_BLOCK {
					break;
				}
				levels += 1;
				let mut cursor = BlockCursor::new(block);
				match cursor.next()? {
					Some(BlockEntry::Index { position: child, .. }) => position = child,
					_ => break,
				}
			}
			return Ok(1 + levels);
		}
		let span = self.refs_end.saturating_sub(FILE_HEADER_LEN as u64);
		let blocks = (span + u64::from(self.block_size) - 1) / u64::from(self.block_size);
		Ok((blocks + 1) / 2)
	}
}

/// Scan/seek cursor over one table's ref section.
pub struct TableRefCursor<'a, S: BlockSource> {
	reader: &'a Reader<S>,
	cursor: Option<BlockCursor>,
	next_position: u64,
	end: u64,
	include_deletes: bool,
	closed: bool,
}

impl<'a, S: BlockSource> RefCursor for TableRefCursor<'a, S> {
	fn next(&mut self) -> Result<Option<RefRecord>> {
		if self.closed {
			return Err(Error::Closed);
		}
		loop {
			if self.cursor.is_none() {
				match self.reader.load_data_block(self.next_position, self.end, REF_BLOCK)? {
					None => return Ok(None),
					Some(block) => {
						self.next_position = block.position() + block.body_len() as u64;
						self.cursor = Some(BlockCursor::new(Arc::new(block)));
					}
				}
			}
			match self.cursor.as_mut().unwrap().next()? {
				Some(BlockEntry::Ref(rec)) => {
					if rec.is_deletion() && !self.include_deletes {
						continue;
					}
					if let Err(e) = rec.validate() {
						log::warn!(target: "reftable", "Skipping invalid ref: {}", e);
						continue;
					}
					return Ok(Some(rec));
				}
				Some(_) => {
					return Err(Error::MalformedBlock {
						position: self.next_position,
						offset: 0,
						reason: "non-ref entry in ref block".into(),
					})
				}
				None => self.cursor = None,
			}
		}
	}

	fn seek(&mut self, name: &str) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		let (cursor, next_position) = self.reader.position_ref(name.as_bytes())?;
		self.cursor = cursor;
		self.next_position = next_position;
		Ok(())
	}

	fn close(&mut self) {
		self.closed = true;
		self.cursor = None;
	}
}

/// Scan/seek cursor over one table's log section.
pub struct TableLogCursor<'a, S: BlockSource> {
	reader: &'a Reader<S>,
	cursor: Option<BlockCursor>,
	next_position: u64,
	end: u64,
	closed: bool,
}

impl<'a, S: BlockSource> LogCursor for TableLogCursor<'a, S> {
	fn next(&mut self) -> Result<Option<LogRecord>> {
		if self.closed {
			return Err(Error::Closed);
		}
		loop {
			if self.cursor.is_none() {
				match self.reader.load_data_block(self.next_position, self.end, LOG_BLOCK)? {
					None => return Ok(None),
					Some(block) => {
						self.next_position = block.position() + block.body_len() as u64;
						self.cursor = Some(BlockCursor::new(Arc::new(block)));
					}
				}
			}
			match self.cursor.as_mut().unwrap().next()? {
				Some(BlockEntry::Log(rec)) => return Ok(Some(rec)),
				Some(_) => {
					return Err(Error::MalformedBlock {
						position: self.next_position,
						offset: 0,
						reason: "non-log entry in log block".into(),
					})
				}
				None => self.cursor = None,
			}
		}
	}

	fn seek(&mut self, name: &str, time: u32) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		let (cursor, next_position) = self.reader.position_log(&log_key(name, time))?;
		self.cursor = cursor;
		self.next_position = next_position;
		Ok(())
	}

	fn close(&mut self) {
		self.closed = true;
		self.cursor = None;
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::options::WriterOptions;
	use crate::record::ZERO_ID;
	use crate::source::MemSource;
	use crate::writer::{Writer, WriterStats};

	fn id(n: u64) -> ObjectId {
		let mut id = ZERO_ID;
		id[12..].copy_from_slice(&n.to_be_bytes());
		id
	}

	fn direct(name: &str, n: u64) -> RefRecord {
		RefRecord::Direct { name: name.into(), id: id(n) }
	}

	fn log(name: &str, time: u32, old: u64, new: u64) -> LogRecord {
		LogRecord {
			name: name.into(),
			time,
			old_id: id(old),
			new_id: id(new),
			tz_offset: 60,
			who_name: "A U Thor".into(),
			who_email: "author@example.com".into(),
			message: "update\n".into(),
		}
	}

	fn table(
		refs: &[RefRecord],
		logs: &[LogRecord],
		options: WriterOptions,
	) -> (Vec<u8>, WriterStats) {
		env_logger::try_init().ok();
		let mut out = Vec::new();
		let mut writer = Writer::new(&mut out, options).unwrap();
		for rec in refs {
			writer.add_ref(rec).unwrap();
		}
		for rec in logs {
			writer.add_log(rec).unwrap();
		}
		let stats = writer.finish().unwrap();
		(out, stats)
	}

	fn reader(bytes: Vec<u8>) -> Reader<MemSource> {
		Reader::open(MemSource::new(bytes)).unwrap()
	}

	#[test]
	fn empty_table_reads_empty() {
		let (bytes, _) = table(&[], &[], WriterOptions::default());
		assert_eq!(bytes.len(), 92);
		let r = reader(bytes);
		assert_eq!(r.all_refs().next().unwrap(), None);
		assert_eq!(r.all_logs().next().unwrap(), None);
	}

	#[test]
	fn single_ref_seeks() {
		let (bytes, _) = table(
			&[direct("refs/heads/master", 1)],
			&[],
			WriterOptions::default(),
		);
		let r = reader(bytes);

		let mut cursor = r.seek_ref("refs/heads/master").unwrap();
		let rec = cursor.next().unwrap().unwrap();
		assert_eq!(rec, direct("refs/heads/master", 1));

		// A prefix of the name lands on the same record.
		let mut cursor = r.seek_ref("refs/heads/m").unwrap();
		assert_eq!(cursor.next().unwrap().unwrap().name(), "refs/heads/master");

		// Past the only key.
		let mut cursor = r.seek_ref("refs/heads/n").unwrap();
		assert_eq!(cursor.next().unwrap(), None);

		assert!(r.has_ref("refs/heads/master").unwrap());
		assert!(!r.has_ref("refs/heads/m").unwrap());
	}

	#[test]
	fn sorted_scan_over_567_refs() {
		let refs: Vec<RefRecord> = (1..=567u64)
			.map(|i| direct(&format!("refs/heads/{:03}", i), i))
			.collect();
		let (bytes, stats) = table(&refs, &[], WriterOptions::default());
		assert_eq!(stats.ref_blocks, 4);
		assert_eq!(stats.ref_index_keys, 0);

		let r = reader(bytes);
		let mut cursor = r.all_refs();
		for expect in &refs {
			assert_eq!(&cursor.next().unwrap().unwrap(), expect);
		}
		assert_eq!(cursor.next().unwrap(), None);

		let mut cursor = r.seek_ref("refs/heads/500").unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), direct("refs/heads/500", 500));

		// 4 data blocks, no index: expect ceil(4 / 2) probes.
		assert_eq!(r.estimated_seeks_per_ref_read().unwrap(), 2);
	}

	#[test]
	fn symbolic_ref_round_trip() {
		let head = RefRecord::Symbolic { name: "HEAD".into(), target: "refs/heads/master".into() };
		let (bytes, _) = table(
			&[head.clone(), direct("refs/heads/master", 1)],
			&[],
			WriterOptions::default(),
		);
		let r = reader(bytes);
		let mut cursor = r.seek_ref("HEAD").unwrap();
		let rec = cursor.next().unwrap().unwrap();
		assert!(rec.is_symbolic());
		assert_eq!(rec.symbolic_target(), Some("refs/heads/master"));
		assert_eq!(rec.object_id(), None);
		assert_eq!(rec, head);
	}

	#[test]
	fn reflog_orders_newest_first() {
		// Log keys carry reversed time, so the newer entry has the
		// smaller key and must be written first.
		let newer = log("refs/heads/master", 1_500_079_800, 1, 2);
		let older = log("refs/heads/master", 1_500_079_709, 0, 1);
		let (bytes, stats) = table(
			&[direct("refs/heads/master", 2)],
			&[newer.clone(), older.clone()],
			WriterOptions::default(),
		);
		assert_eq!(stats.logs, 2);
		let r = reader(bytes);

		let mut cursor = r.all_logs();
		assert_eq!(cursor.next().unwrap().unwrap(), newer);
		assert_eq!(cursor.next().unwrap().unwrap(), older);
		assert_eq!(cursor.next().unwrap(), None);

		// The newest entry at or before the given time.
		let mut cursor = r.seek_log("refs/heads/master", 1_500_079_750).unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), older);

		let mut cursor = r.seek_log("refs/heads/master", 1_500_079_800).unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), newer);
	}

	#[test]
	fn tombstones_hidden_by_default() {
		let gone = RefRecord::Deletion { name: "refs/heads/gone".into() };
		let (bytes, _) = table(
			&[direct("refs/heads/alive", 1), gone.clone()],
			&[],
			WriterOptions::default(),
		);
		let mut r = reader(bytes);
		let mut cursor = r.all_refs();
		assert_eq!(cursor.next().unwrap().unwrap().name(), "refs/heads/alive");
		assert_eq!(cursor.next().unwrap(), None);
		assert!(!r.has_ref("refs/heads/gone").unwrap());

		r.set_include_deletes(true);
		let mut cursor = r.seek_ref("refs/heads/gone").unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), gone);
		assert!(r.has_ref("refs/heads/gone").unwrap());
	}

	#[test]
	fn invalid_ref_records_are_skipped() {
		use crate::block::BlockWriter;
		use crate::stream::OutputStream;
		use crate::writer::header_bytes;

		// Records the writer refuses, planted straight into a ref
		// block: a peeled tag without a peeled id and a symbolic ref
		// with a malformed target.
		let bad_tag = RefRecord::PeeledTag {
			name: "refs/tags/hollow".into(),
			id: id(2),
			peeled: ZERO_ID,
		};
		let bad_link = RefRecord::Symbolic {
			name: "refs/tags/loose".into(),
			target: "refs//nowhere".into(),
		};
		let good = RefRecord::Direct { name: "refs/tags/solid".into(), id: id(1) };

		let options = WriterOptions::default();
		let mut bw = BlockWriter::new(
			crate::block::REF_BLOCK,
			options.block_size,
			FILE_HEADER_LEN as u32,
			options.restart_interval,
		);
		for rec in &[&bad_tag, &bad_link, &good] {
			let mut value = Vec::new();
			rec.encode_value(&mut value);
			assert!(bw.try_add(rec.name().as_bytes(), rec.type_bits(), &value).unwrap());
		}
		let mut out = Vec::new();
		let mut os = OutputStream::new(&mut out, options.alignment());
		os.write_file_header(&header_bytes(&options));
		bw.write_to(&mut os).unwrap();
		let mut footer = Vec::with_capacity(FILE_FOOTER_LEN);
		footer.extend_from_slice(&header_bytes(&options));
		footer.extend_from_slice(&[0u8; 40]);
		let mut hasher = crc32fast::Hasher::new();
		hasher.update(&footer);
		footer.extend_from_slice(&hasher.finalize().to_be_bytes());
		os.finish(&footer).unwrap();

		let r = reader(out);
		let mut cursor = r.all_refs();
		assert_eq!(cursor.next().unwrap().unwrap(), good);
		assert_eq!(cursor.next().unwrap(), None);

		// Seeking past the bad records lands on the good one too.
		let mut cursor = r.seek_ref("refs/tags/hollow").unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), good);
	}

	#[test]
	fn indexed_seek_over_many_blocks() {
		let refs: Vec<RefRecord> = (0..2000u64)
			.map(|i| direct(&format!("refs/heads/branch-{:06}", i), i))
			.collect();
		let mut options = WriterOptions::default();
		options.block_size = 512;
		let (bytes, stats) = table(&refs, &[], options);
		assert!(stats.ref_blocks > 4);
		assert_eq!(stats.ref_index_keys, stats.ref_blocks);
		assert!(stats.ref_index_bytes > 0);

		let r = reader(bytes);
		for probe in &[0u64, 1, 999, 1998, 1999] {
			let name = format!("refs/heads/branch-{:06}", probe);
			let mut cursor = r.seek_ref(&name).unwrap();
			assert_eq!(cursor.next().unwrap().unwrap(), refs[*probe as usize]);
		}
		let mut cursor = r.seek_ref("refs/heads/branch-002000").unwrap();
		assert_eq!(cursor.next().unwrap(), None);

		assert!(r.estimated_seeks_per_ref_read().unwrap() >= 2);

		// A seek still iterates across block boundaries.
		let mut cursor = r.seek_ref("refs/heads/branch-000000").unwrap();
		for expect in &refs {
			assert_eq!(&cursor.next().unwrap().unwrap(), expect);
		}
		assert_eq!(cursor.next().unwrap(), None);
	}

	#[test]
	fn logs_span_blocks() {
		let mut logs = Vec::new();
		for ref_no in 0..20u64 {
			let name = format!("refs/heads/branch-{:02}", ref_no);
			for t in (0..10u32).rev() {
				logs.push(log(&name, 1_000_000 + t * 100, ref_no, ref_no + 1));
			}
		}
		let mut options = WriterOptions::default();
		options.block_size = 512;
		let (bytes, stats) = table(&[], &logs, options);
		assert!(stats.log_blocks > 1);
		assert_eq!(stats.ref_blocks, 0);

		let r = reader(bytes);
		let mut cursor = r.all_logs();
		for expect in &logs {
			assert_eq!(&cursor.next().unwrap().unwrap(), expect);
		}
		assert_eq!(cursor.next().unwrap(), None);

		let mut cursor = r.seek_log("refs/heads/branch-07", 1_000_450).unwrap();
		let rec = cursor.next().unwrap().unwrap();
		assert_eq!(rec.name, "refs/heads/branch-07");
		assert_eq!(rec.time, 1_000_400);
	}

	#[test]
	fn object_id_lookup_via_obj_section() {
		let refs = vec![
			direct("refs/heads/a", 7),
			direct("refs/heads/b", 8),
			direct("refs/heads/c", 7),
			RefRecord::Symbolic { name: "refs/heads/link".into(), target: "refs/heads/a".into() },
		];
		let mut options = WriterOptions::default();
		options.index_objects = true;
		let (bytes, stats) = table(&refs, &[], options);
		assert!(stats.obj_blocks > 0);
		assert!(stats.obj_id_len >= 2);

		let r = reader(bytes);
		assert!(r.has_objs());
		let mut found = r.refs_by_object_id(&id(7)).unwrap();
		found.sort_by(|a, b| a.name().cmp(b.name()));
		assert_eq!(found, vec![direct("refs/heads/a", 7), direct("refs/heads/c", 7)]);
		assert_eq!(r.refs_by_object_id(&id(9)).unwrap(), vec![]);
	}

	#[test]
	fn object_id_lookup_without_obj_section() {
		let refs = vec![direct("refs/heads/a", 7), direct("refs/heads/b", 8)];
		let (bytes, stats) = table(&refs, &[], WriterOptions::default());
		assert_eq!(stats.obj_blocks, 0);
		let r = reader(bytes);
		assert!(!r.has_objs());
		assert_eq!(r.refs_by_object_id(&id(8)).unwrap(), vec![direct("refs/heads/b", 8)]);
	}

	#[test]
	fn unpadded_file_round_trips() {
		let refs: Vec<RefRecord> = (0..200u64)
			.map(|i| direct(&format!("refs/heads/{:04}", i), i))
			.collect();
		let mut options = WriterOptions::default();
		options.block_size = 512;
		options.alignment = Some(1);
		let (bytes, stats) = table(&refs, &[], options);
		assert_eq!(stats.padding_bytes, 0);
		assert!(stats.ref_blocks > 1);

		let r = reader(bytes);
		let mut cursor = r.all_refs();
		for expect in &refs {
			assert_eq!(&cursor.next().unwrap().unwrap(), expect);
		}
		assert_eq!(cursor.next().unwrap(), None);

		let mut cursor = r.seek_ref("refs/heads/0123").unwrap();
		assert_eq!(cursor.next().unwrap().unwrap(), refs[123]);
	}

	#[test]
	fn open_is_idempotent() {
		let refs: Vec<RefRecord> = (0..100u64)
			.map(|i| direct(&format!("refs/heads/{:04}", i), i))
			.collect();
		let (bytes, _) = table(&refs, &[], WriterOptions::default());
		let a = reader(bytes.clone());
		let b = reader(bytes);
		let mut ca = a.all_refs();
		let mut cb = b.all_refs();
		loop {
			let ra = ca.next().unwrap();
			let rb = cb.next().unwrap();
			assert_eq!(ra, rb);
			if ra.is_none() {
				break;
			}
		}
	}

	#[test]
	fn corrupt_magic_and_crc_are_rejected() {
		let (bytes, _) = table(&[direct("refs/heads/master", 1)], &[], WriterOptions::default());

		let mut bad = bytes.clone();
		bad[0] = 0x02;
		assert!(matches!(
			Reader::open(MemSource::new(bad)),
			Err(Error::MalformedHeader(_))
		));

		let mut bad = bytes.clone();
		let at = bad.len() - 10;
		bad[at] ^= 0xff;
		assert!(matches!(
			Reader::open(MemSource::new(bad)),
			Err(Error::MalformedFooter(_))
		));

		let mut bad = bytes;
		bad.truncate(50);
		assert!(matches!(
			Reader::open(MemSource::new(bad)),
			Err(Error::MalformedHeader(_))
		));
	}

	#[test]
	fn closed_cursor_rejects_use() {
		let (bytes, _) = table(&[direct("refs/heads/master", 1)], &[], WriterOptions::default());
		let r = reader(bytes);
		let mut cursor = r.all_refs();
		cursor.close();
		assert!(matches!(cursor.next(), Err(Error::Closed)));
		assert!(matches!(cursor.seek("refs/heads/master"), Err(Error::Closed)));
	}

	#[test]
	fn header_fields_are_exposed() {
		let mut options = WriterOptions::default();
		options.min_update_index = 3;
		options.max_update_index = 9;
		let (bytes, _) = table(&[direct("refs/heads/master", 1)], &[], options);
		let r = reader(bytes);
		assert_eq!(r.min_update_index(), 3);
		assert_eq!(r.max_update_index(), 9);
		assert_eq!(r.block_size(), 4096);
	}
}
