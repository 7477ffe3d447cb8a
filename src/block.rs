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

// On disk layout of one block.
//
// [TYPE: 1][BODY_LEN: 3]
// { entries }
// [restart_offset: 4] * restart_count
// [restart_count: 2]
// zero padding to the alignment multiple
//
// TYPE - 'r' refs, 'g' logs, 'o' object ids, 0x80 index.
// BODY_LEN - big-endian count of used bytes from the TYPE byte through
// the restart count inclusive. Padding follows.
//
// Entry:
// [pfx_len: varint][(sfx_len << 2) | type: varint][suffix][value]
// The key is prior_key[0..pfx_len] ++ suffix. Entries listed in the
// restart table store their key in full (pfx_len = 0), anchoring the
// in-block binary search. Restart offsets are relative to the TYPE byte.
//
// Values:
// refs    - per the 2-bit type, see record.rs
// logs    - see record.rs, type bits always 0
// index   - [block_position: varint], key is the last key of that block
// obj ids - [n: varint][pos_0: varint][pos_i - pos_i-1: varint]*, key is
//           a truncated object id, positions are ref block positions

use crate::codec::{common_prefix, read_varint, suffix_word, varint_len};
use crate::error::{Error, Result};
use crate::record::{LogRecord, RefRecord};

pub const REF_BLOCK: u8 = b'r';
pub const LOG_BLOCK: u8 = b'g';
pub const OBJ_BLOCK: u8 = b'o';
pub const INDEX_BLOCK: u8 = 0x80;

/// Tag byte, 3-byte length word.
pub const BLOCK_HEADER_LEN: usize = 4;
/// Restart count is stored as a u16.
pub const MAX_RESTARTS: usize = 65535;

const RESTART_OFFSET_LEN: usize = 4;
const RESTART_COUNT_LEN: usize = 2;

fn malformed(position: u64, offset: u32, reason: &str) -> Error {
	Error::MalformedBlock { position, offset, reason: reason.into() }
}

struct PendingEntry {
	key: Vec<u8>,
	type_bits: u8,
	value: Vec<u8>,
	restart: bool,
}

/// Accumulates entries of one block type and serializes them as a block
/// once no further entry fits.
pub struct BlockWriter {
	block_type: u8,
	/// Usable bytes; the first block of a file cedes 24 to the header.
	capacity: usize,
	header_share: usize,
	restart_interval: u16,
	entries: Vec<PendingEntry>,
	entry_bytes: usize,
	restart_count: usize,
	last_key: Vec<u8>,
}

impl BlockWriter {
	pub fn new(block_type: u8, block_size: u32, header_share: u32, restart_interval: u16) -> BlockWriter {
		debug_assert!(restart_interval >= 1);
		BlockWriter {
			block_type,
			capacity: (block_size - header_share) as usize,
			header_share: header_share as usize,
			restart_interval,
			entries: Vec::new(),
			entry_bytes: 0,
			restart_count: 0,
			last_key: Vec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entry_count(&self) -> usize {
		self.entries.len()
	}

	pub fn last_key(&self) -> &[u8] {
		&self.last_key
	}

	fn encoded_len(pfx: usize, key_len: usize, value_len: usize, type_bits: u8) -> usize {
		varint_len(pfx as u64)
			+ varint_len(suffix_word(key_len - pfx, type_bits))
			+ (key_len - pfx)
			+ value_len
	}

	fn projected(&self, extra_entry: usize, extra_restart: bool) -> usize {
		BLOCK_HEADER_LEN
			+ self.entry_bytes
			+ extra_entry
			+ RESTART_OFFSET_LEN * (self.restart_count + extra_restart as usize)
			+ RESTART_COUNT_LEN
	}

	/// Fit-tests and appends one entry. Returns false when the block is
	/// full; fails with `BlockSizeTooSmall` when even an empty block
	/// cannot take the entry. Index blocks are exempt from the latter:
	/// a lone oversized entry grows the block past the nominal size.
	pub fn try_add(&mut self, key: &[u8], type_bits: u8, value: &[u8]) -> Result<bool> {
		let pfx = common_prefix(&self.last_key, key);
		let rule_restart = self.entries.is_empty()
			|| (self.entries.len() + 1) % usize::from(self.restart_interval) == 0
			|| pfx == 0;
		let restart = rule_restart && self.restart_count < MAX_RESTARTS;

		let restart_entry = Self::encoded_len(0, key.len(), value.len(), type_bits);
		let entry = if restart {
			restart_entry
		} else {
			Self::encoded_len(pfx, key.len(), value.len(), type_bits)
		};

		if self.projected(entry, restart) <= self.capacity {
			self.push(key, type_bits, value, restart, entry);
			return Ok(true);
		}
		// A restart that overflows may still fit without its restart
		// table slot; do not waste the tail of a nearly full block. A
		// zero prefix keeps the full-key encoding either way.
		if restart && !self.entries.is_empty() {
			let entry = Self::encoded_len(pfx, key.len(), value.len(), type_bits);
			if self.projected(entry, false) <= self.capacity {
				self.push(key, type_bits, value, false, entry);
				return Ok(true);
			}
		}
		if self.entries.is_empty() {
			if self.block_type == INDEX_BLOCK {
				self.push(key, type_bits, value, true, restart_entry);
				return Ok(true);
			}
			let min = self.header_share
				+ BLOCK_HEADER_LEN
				+ restart_entry
				+ RESTART_OFFSET_LEN
				+ RESTART_COUNT_LEN;
			return Err(Error::BlockSizeTooSmall(min as u32));
		}
		Ok(false)
	}

	fn push(&mut self, key: &[u8], type_bits: u8, value: &[u8], restart: bool, encoded: usize) {
		self.entries.push(PendingEntry {
			key: key.to_vec(),
			type_bits,
			value: value.to_vec(),
			restart,
		});
		self.entry_bytes += encoded;
		if restart {
			self.restart_count += 1;
		}
		self.last_key.clear();
		self.last_key.extend_from_slice(key);
	}

	/// Serializes the accumulated entries through the stream. Index
	/// blocks pick their restarts here, spread as evenly as the u16
	/// restart count allows; other block types use the decisions made
	/// at append time. Returns the block's file position.
	pub fn write_to<W: std::io::Write>(&self, os: &mut crate::stream::OutputStream<W>) -> Result<u64> {
		debug_assert!(!self.entries.is_empty());
		os.begin_block(self.block_type);
		let stride = std::cmp::max(
			usize::from(self.restart_interval),
			self.entries.len() / (MAX_RESTARTS + 1),
		);
		let mut restarts: Vec<u32> = Vec::new();
		let mut prev: &[u8] = &[];
		for (i, e) in self.entries.iter().enumerate() {
			let restart = if self.block_type == INDEX_BLOCK {
				i % stride == 0 && restarts.len() < MAX_RESTARTS
			} else {
				e.restart
			};
			if restart {
				restarts.push(os.block_offset());
			}
			let pfx = if restart { 0 } else { common_prefix(prev, &e.key) };
			os.write_varint(pfx as u64);
			os.write_varint(suffix_word(e.key.len() - pfx, e.type_bits));
			os.write_raw(&e.key[pfx..]);
			os.write_raw(&e.value);
			prev = &e.key;
		}
		for r in &restarts {
			os.write_u32(*r);
		}
		os.write_u16(restarts.len() as u16);
		os.flush_block()
	}
}

/// One decoded entry, discriminated by the block type it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEntry {
	Ref(RefRecord),
	Log(LogRecord),
	Index { last_key: Vec<u8>, position: u64 },
	Obj { id_prefix: Vec<u8>, positions: Vec<u64> },
}

/// A parsed block: the used byte region plus the located restart table.
pub struct BlockData {
	buf: Vec<u8>,
	position: u64,
	block_type: u8,
	entries_end: usize,
	restart_count: usize,
	restart_table: usize,
}

impl BlockData {
	/// `raw` must start at the block's tag byte and cover at least the
	/// used region; trailing padding is discarded.
	pub fn parse(position: u64, mut raw: Vec<u8>, expect: Option<u8>) -> Result<BlockData> {
		if raw.len() < BLOCK_HEADER_LEN {
			return Err(malformed(position, 0, "truncated block header"));
		}
		let block_type = raw[0];
		if let Some(t) = expect {
			if t != block_type {
				return Err(malformed(position, 0, "unexpected block type"));
			}
		}
		let body_len = u32::from_be_bytes([0, raw[1], raw[2], raw[3]]) as usize;
		if body_len < BLOCK_HEADER_LEN + RESTART_COUNT_LEN || body_len > raw.len() {
			return Err(malformed(position, 0, "block length overruns block"));
		}
		raw.truncate(body_len);
		let restart_count =
			u16::from_be_bytes([raw[body_len - 2], raw[body_len - 1]]) as usize;
		let tail = RESTART_COUNT_LEN + RESTART_OFFSET_LEN * restart_count;
		if BLOCK_HEADER_LEN + tail > body_len {
			return Err(malformed(position, 0, "restart table overruns block"));
		}
		let restart_table = body_len - tail;
		Ok(BlockData {
			buf: raw,
			position,
			block_type,
			entries_end: restart_table,
			restart_count,
			restart_table,
		})
	}

	pub fn block_type(&self) -> u8 {
		self.block_type
	}

	pub fn position(&self) -> u64 {
		self.position
	}

	/// Used length on disk, padding excluded.
	pub fn body_len(&self) -> usize {
		self.buf.len()
	}

	pub fn restart_count(&self) -> usize {
		self.restart_count
	}

	pub fn restart_offset(&self, i: usize) -> usize {
		let at = self.restart_table + RESTART_OFFSET_LEN * i;
		u32::from_be_bytes([self.buf[at], self.buf[at + 1], self.buf[at + 2], self.buf[at + 3]])
			as usize
	}

	/// Full key of the restart entry `i`. Restart entries must not be
	/// prefix-compressed.
	fn restart_key(&self, i: usize) -> Result<&[u8]> {
		let mut pos = self.restart_offset(i);
		let entry_off = pos as u32;
		if pos >= self.entries_end {
			return Err(malformed(self.position, entry_off, "restart offset out of range"));
		}
		let pfx = read_varint(&self.buf[..self.entries_end], &mut pos)
			.ok_or_else(|| malformed(self.position, entry_off, "bad restart entry"))?;
		if pfx != 0 {
			return Err(malformed(self.position, entry_off, "restart entry is prefix-compressed"));
		}
		let word = read_varint(&self.buf[..self.entries_end], &mut pos)
			.ok_or_else(|| malformed(self.position, entry_off, "bad restart entry"))?;
		let sfx = (word >> 2) as usize;
		if pos + sfx > self.entries_end {
			return Err(malformed(self.position, entry_off, "restart key overruns block"));
		}
		Ok(&self.buf[pos..pos + sfx])
	}
}

/// Sequential and seeking access to one block. Decoded block bytes are
/// shared so a cached block serves many cursors; records are copied out
/// on `next`.
pub struct BlockCursor {
	block: std::sync::Arc<BlockData>,
	pos: usize,
	key: Vec<u8>,
}

impl BlockCursor {
	pub fn new(block: std::sync::Arc<BlockData>) -> BlockCursor {
		BlockCursor { block, pos: BLOCK_HEADER_LEN, key: Vec::new() }
	}

	pub fn at_end(&self) -> bool {
		self.pos >= self.block.entries_end
	}

	/// Decodes the next entry, reconstructing its key from the prior
	/// one. Returns `None` at the end of the entry region.
	pub fn next(&mut self) -> Result<Option<BlockEntry>> {
		if self.at_end() {
			return Ok(None);
		}
		let position = self.block.position;
		let entry_off = self.pos as u32;
		let end = self.block.entries_end;
		let window = &self.block.buf[..end];

		let pfx = read_varint(window, &mut self.pos)
			.ok_or_else(|| malformed(position, entry_off, "bad prefix length"))? as usize;
		let word = read_varint(window, &mut self.pos)
			.ok_or_else(|| malformed(position, entry_off, "bad suffix word"))?;
		let sfx = (word >> 2) as usize;
		let type_bits = (word & 3) as u8;
		if pfx > self.key.len() {
			return Err(malformed(position, entry_off, "prefix exceeds prior key"));
		}
		if self.pos + sfx > end {
			return Err(malformed(position, entry_off, "suffix overruns block"));
		}
		self.key.truncate(pfx);
		self.key.extend_from_slice(&window[self.pos..self.pos + sfx]);
		self.pos += sfx;

		let entry = match self.block.block_type {
			REF_BLOCK => BlockEntry::Ref(
				RefRecord::decode_value(type_bits, &self.key, window, &mut self.pos)
					.ok_or_else(|| malformed(position, entry_off, "bad ref value"))?,
			),
			LOG_BLOCK => {
				if type_bits != 0 {
					return Err(malformed(position, entry_off, "bad log entry type"));
				}
				BlockEntry::Log(
					LogRecord::decode(&self.key, window, &mut self.pos)
						.ok_or_else(|| malformed(position, entry_off, "bad log value"))?,
				)
			}
			INDEX_BLOCK => {
				let block_position = read_varint(window, &mut self.pos)
					.ok_or_else(|| malformed(position, entry_off, "bad index value"))?;
				BlockEntry::Index { last_key: self.key.clone(), position: block_position }
			}
			OBJ_BLOCK => {
				let n = read_varint(window, &mut self.pos)
					.ok_or_else(|| malformed(position, entry_off, "bad obj count"))?;
				let mut positions = Vec::with_capacity(n as usize);
				let mut last = 0u64;
				for i in 0..n {
					let delta = read_varint(window, &mut self.pos)
						.ok_or_else(|| malformed(position, entry_off, "bad obj position"))?;
					last = if i == 0 { delta } else { last + delta };
					positions.push(last);
				}
				BlockEntry::Obj { id_prefix: self.key.clone(), positions }
			}
			_ => return Err(malformed(position, entry_off, "unknown block type")),
		};
		if self.pos > end {
			return Err(malformed(position, entry_off, "value overruns block"));
		}
		Ok(Some(entry))
	}

	/// Positions the cursor so that the next `next` returns the least
	/// entry with key >= `target`, or nothing when the whole block is
	/// below the target.
	pub fn seek(&mut self, target: &[u8]) -> Result<()> {
		if self.block.restart_count == 0 {
			self.pos = self.block.entries_end;
			self.key.clear();
			return Ok(());
		}
		// Greatest restart whose full key is <= target; the target can
		// only live in that restart group.
		let mut lo = 0usize;
		let mut hi = self.block.restart_count;
		while lo < hi {
			let mid = (lo + hi) / 2;
			if self.block.restart_key(mid)? <= target {
				lo = mid + 1;
			} else {
				hi = mid;
			}
		}
		let group = lo.saturating_sub(1);
		self.pos = self.block.restart_offset(group);
		self.key.clear();
		loop {
			if self.at_end() {
				return Ok(());
			}
			let save_pos = self.pos;
			let save_key = self.key.clone();
			self.next()?;
			if self.key.as_slice() >= target {
				self.pos = save_pos;
				self.key = save_key;
				return Ok(());
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::record::{ObjectId, RefRecord, ZERO_ID};
	use crate::stream::OutputStream;

	fn id(byte: u8) -> ObjectId {
		let mut id = ZERO_ID;
		id[19] = byte;
		id
	}

	fn ref_value(rec: &RefRecord) -> Vec<u8> {
		let mut v = Vec::new();
		rec.encode_value(&mut v);
		v
	}

	fn build_ref_block(names: &[String], block_size: u32, interval: u16) -> Vec<u8> {
		let mut bw = BlockWriter::new(REF_BLOCK, block_size, 0, interval);
		for (i, name) in names.iter().enumerate() {
			let rec = RefRecord::Direct { name: name.clone(), id: id(i as u8) };
			assert!(bw.try_add(name.as_bytes(), rec.type_bits(), &ref_value(&rec)).unwrap());
		}
		let mut out = Vec::new();
		let mut os = OutputStream::new(&mut out, block_size);
		bw.write_to(&mut os).unwrap();
		os.finish(&[]).unwrap();
		out
	}

	fn names(n: usize) -> Vec<String> {
		(0..n).map(|i| format!("refs/heads/branch-{:04}", i)).collect()
	}

	#[test]
	fn block_round_trip_in_order() {
		let names = names(50);
		let raw = build_ref_block(&names, 4096, 16);
		let block = BlockData::parse(0, raw, Some(REF_BLOCK)).unwrap();
		let mut cursor = BlockCursor::new(std::sync::Arc::new(block));
		for (i, name) in names.iter().enumerate() {
			match cursor.next().unwrap().unwrap() {
				BlockEntry::Ref(RefRecord::Direct { name: n, id: got }) => {
					assert_eq!(&n, name);
					assert_eq!(got, id(i as u8));
				}
				other => panic!("unexpected entry {:?}", other),
			}
		}
		assert_eq!(cursor.next().unwrap(), None);
	}

	#[test]
	fn restart_entries_store_full_keys() {
		let raw = build_ref_block(&names(80), 8192, 16);
		let block = BlockData::parse(0, raw, Some(REF_BLOCK)).unwrap();
		assert!(block.restart_count() > 1);
		for i in 0..block.restart_count() {
			let mut pos = block.restart_offset(i);
			let pfx = read_varint(&block.buf, &mut pos).unwrap();
			assert_eq!(pfx, 0);
		}
	}

	#[test]
	fn seek_exact_prefix_and_past_end() {
		let names = names(50);
		let raw = build_ref_block(&names, 4096, 16);
		let block = BlockData::parse(0, raw, Some(REF_BLOCK)).unwrap();

		let mut cursor = BlockCursor::new(std::sync::Arc::new(block));
		cursor.seek(b"refs/heads/branch-0031").unwrap();
		match cursor.next().unwrap().unwrap() {
			BlockEntry::Ref(rec) => assert_eq!(rec.name(), "refs/heads/branch-0031"),
			other => panic!("unexpected entry {:?}", other),
		}

		// Not a stored key: lands on the next greater one.
		cursor.seek(b"refs/heads/branch-0031x").unwrap();
		match cursor.next().unwrap().unwrap() {
			BlockEntry::Ref(rec) => assert_eq!(rec.name(), "refs/heads/branch-0032"),
			other => panic!("unexpected entry {:?}", other),
		}

		// Before the first key.
		cursor.seek(b"refs/heads/a").unwrap();
		match cursor.next().unwrap().unwrap() {
			BlockEntry::Ref(rec) => assert_eq!(rec.name(), "refs/heads/branch-0000"),
			other => panic!("unexpected entry {:?}", other),
		}

		// Past every key.
		cursor.seek(b"refs/tags/zzz").unwrap();
		assert_eq!(cursor.next().unwrap(), None);
	}

	#[test]
	fn full_block_rejects_then_accepts_in_new_block() {
		let names = names(4000);
		let mut bw = BlockWriter::new(REF_BLOCK, 1024, 0, 16);
		let mut accepted = 0;
		for (i, name) in names.iter().enumerate() {
			let rec = RefRecord::Direct { name: name.clone(), id: id(i as u8) };
			if !bw.try_add(name.as_bytes(), rec.type_bits(), &ref_value(&rec)).unwrap() {
				break;
			}
			accepted += 1;
		}
		assert!(accepted > 0 && accepted < names.len());
		// The rejected entry fits a fresh block.
		let mut next = BlockWriter::new(REF_BLOCK, 1024, 0, 16);
		let rec = RefRecord::Direct { name: names[accepted].clone(), id: id(0) };
		assert!(next
			.try_add(names[accepted].as_bytes(), rec.type_bits(), &ref_value(&rec))
			.unwrap());
	}

	#[test]
	fn full_restart_retries_without_restart_slot() {
		// Each tombstone entry encodes to 4 bytes. With "bb" in place
		// (4 header + 4 entry + 4 restart + 2 count), "zz" shares no
		// prefix and the rule marks it as a restart: 22 bytes
		// registered, 18 unregistered. A 20-byte block only takes it
		// through the retry.
		let mut bw = BlockWriter::new(REF_BLOCK, 20, 0, 16);
		assert!(bw.try_add(b"bb", 0, &[]).unwrap());
		assert!(bw.try_add(b"zz", 0, &[]).unwrap());

		let mut out = Vec::new();
		let mut os = OutputStream::new(&mut out, 20);
		bw.write_to(&mut os).unwrap();
		os.finish(&[]).unwrap();

		let block = BlockData::parse(0, out, Some(REF_BLOCK)).unwrap();
		assert_eq!(block.restart_count(), 1);
		let mut cursor = BlockCursor::new(std::sync::Arc::new(block));
		for name in &["bb", "zz"] {
			match cursor.next().unwrap().unwrap() {
				BlockEntry::Ref(RefRecord::Deletion { name: n }) => assert_eq!(&n, name),
				other => panic!("unexpected entry {:?}", other),
			}
		}
		assert_eq!(cursor.next().unwrap(), None);
	}

	#[test]
	fn oversized_first_entry_reports_minimum() {
		let mut bw = BlockWriter::new(REF_BLOCK, 64, 0, 16);
		let name = format!("refs/heads/{}", "x".repeat(100));
		let rec = RefRecord::Direct { name: name.clone(), id: id(1) };
		match bw.try_add(name.as_bytes(), rec.type_bits(), &ref_value(&rec)) {
			Err(Error::BlockSizeTooSmall(min)) => assert!(min > 64),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn log_block_round_trip() {
		use crate::record::LogRecord;
		let recs: Vec<LogRecord> = (0..3)
			.map(|i| LogRecord {
				name: "refs/heads/master".into(),
				time: 1_500_000_000 + 100 - i * 50,
				old_id: id(i as u8),
				new_id: id(i as u8 + 1),
				tz_offset: 60,
				who_name: "A U Thor".into(),
				who_email: "author@example.com".into(),
				message: format!("update {}", i),
			})
			.collect();
		let mut bw = BlockWriter::new(LOG_BLOCK, 4096, 0, 16);
		for rec in &recs {
			let mut v = Vec::new();
			rec.encode_value(&mut v);
			assert!(bw.try_add(&rec.key(), 0, &v).unwrap());
		}
		let mut out = Vec::new();
		let mut os = OutputStream::new(&mut out, 4096);
		bw.write_to(&mut os).unwrap();
		os.finish(&[]).unwrap();

		let block = BlockData::parse(0, out, Some(LOG_BLOCK)).unwrap();
		let mut cursor = BlockCursor::new(std::sync::Arc::new(block));
		for rec in &recs {
			match cursor.next().unwrap().unwrap() {
				BlockEntry::Log(got) => assert_eq!(&got, rec),
				other => panic!("unexpected entry {:?}", other),
			}
		}
		assert_eq!(cursor.next().unwrap(), None);
	}

	#[test]
	fn index_block_defers_restarts() {
		let mut bw = BlockWriter::new(INDEX_BLOCK, 4096, 0, 16);
		let mut value = Vec::new();
		for i in 0..40u64 {
			value.clear();
			crate::codec::put_varint(&mut value, i * 4096);
			let key = format!("refs/heads/branch-{:04}", i * 7);
			assert!(bw.try_add(key.as_bytes(), 0, &value).unwrap());
		}
		let mut out = Vec::new();
		let mut os = OutputStream::new(&mut out, 4096);
		bw.write_to(&mut os).unwrap();
		os.finish(&[]).unwrap();

		let block = BlockData::parse(0, out, Some(INDEX_BLOCK)).unwrap();
		// 40 entries, stride 16: restarts at 0, 16, 32.
		assert_eq!(block.restart_count(), 3);
		let mut cursor = BlockCursor::new(std::sync::Arc::new(block));
		cursor.seek(b"refs/heads/branch-0100").unwrap();
		match cursor.next().unwrap().unwrap() {
			BlockEntry::Index { last_key, position } => {
				assert_eq!(last_key, b"refs/heads/branch-0105".to_vec());
				assert_eq!(position, 15 * 4096);
			}
			other => panic!("unexpected entry {:?}", other),
		}
	}

	#[test]
	fn truncated_block_is_malformed() {
		let raw = build_ref_block(&names(10), 4096, 16);
		assert!(matches!(
			BlockData::parse(0, raw[..3].to_vec(), None),
			Err(Error::MalformedBlock { .. })
		));
		let mut short = raw.clone();
		short.truncate(20);
		assert!(matches!(
			BlockData::parse(0, short, Some(REF_BLOCK)),
			Err(Error::MalformedBlock { .. })
		));
	}

	#[test]
	fn wrong_type_is_malformed() {
		let raw = build_ref_block(&names(10), 4096, 16);
		assert!(matches!(
			BlockData::parse(0, raw, Some(LOG_BLOCK)),
			Err(Error::MalformedBlock { .. })
		));
	}
}
