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

// On disk layout of one reftable.
//
// [0..24)   Header:
//           [0..4)   magic 01 'R' 'E' 'F'
//           [4..5)   version, 1
//           [5..8)   block size (u24 BE)
//           [8..16)  min update index (u64 BE)
//           [16..24) max update index (u64 BE)
// [24..)    ref blocks, ref index, obj blocks, obj index,
//           log blocks, log index; all block-aligned
// last 68   Footer:
//           [0..24)  header copy
//           [24..32) ref index position, 0 if absent
//           [32..40) (obj position << 5) | obj id length, 0 if absent
//           [40..48) obj index position, 0 if absent
//           [48..56) log position, 0 if absent
//           [56..64) log index position, 0 if absent
//           [64..68) CRC-32 of footer bytes [0..64)
//
// Sections may be empty; an empty table is header plus footer, 92 bytes.

use std::collections::BTreeMap;
use std::io::Write;

use crate::block::{BlockWriter, LOG_BLOCK, OBJ_BLOCK, REF_BLOCK};
use crate::codec::put_varint;
use crate::error::{Error, Result};
use crate::index::IndexBuilder;
use crate::options::WriterOptions;
use crate::record::{is_valid_ref_name, LogRecord, ObjectId, RefRecord, OBJECT_ID_LEN};
use crate::stream::OutputStream;

pub const FILE_MAGIC: [u8; 4] = [0x01, b'R', b'E', b'F'];
pub const VERSION_1: u8 = 1;
pub const FILE_HEADER_LEN: usize = 24;
pub const FILE_FOOTER_LEN: usize = 68;
/// Bytes of the footer covered by its trailing CRC.
pub const FOOTER_CRC_SPAN: usize = FILE_FOOTER_LEN - 4;

/// With aligned blocks a short ref section is cheaper to probe linearly
/// than through an extra index block.
const ALIGNED_REF_INDEX_THRESHOLD: usize = 4;
const MIN_OBJ_ID_PREFIX: usize = 2;

pub(crate) fn header_bytes(opts: &WriterOptions) -> [u8; FILE_HEADER_LEN] {
	let mut h = [0u8; FILE_HEADER_LEN];
	h[0..4].copy_from_slice(&FILE_MAGIC);
	h[4] = VERSION_1;
	h[5..8].copy_from_slice(&opts.block_size.to_be_bytes()[1..]);
	h[8..16].copy_from_slice(&opts.min_update_index.to_be_bytes());
	h[16..24].copy_from_slice(&opts.max_update_index.to_be_bytes());
	h
}

/// Totals reported by `Writer::finish`.
#[derive(Debug, Default, Clone)]
pub struct WriterStats {
	pub total_bytes: u64,
	pub ref_bytes: u64,
	pub obj_bytes: u64,
	pub log_bytes: u64,
	pub padding_bytes: u64,
	pub ref_blocks: u32,
	pub obj_blocks: u32,
	pub log_blocks: u32,
	pub ref_index_keys: u32,
	pub ref_index_bytes: u64,
	pub ref_index_levels: u32,
	pub obj_index_keys: u32,
	pub obj_index_bytes: u64,
	pub obj_id_len: u32,
	pub refs: u64,
	pub logs: u64,
	pub block_size: u32,
	pub restart_interval: u16,
	pub min_update_index: u64,
	pub max_update_index: u64,
}

impl WriterStats {
	/// Mean used fraction of the emitted data blocks.
	pub fn avg_block_fill(&self) -> f64 {
		let blocks = u64::from(self.ref_blocks + self.obj_blocks + self.log_blocks);
		if blocks == 0 {
			return 0.0;
		}
		let block_bytes = self.ref_bytes + self.obj_bytes + self.log_bytes;
		let used = block_bytes.saturating_sub(self.padding_bytes);
		used as f64 / (blocks * u64::from(self.block_size)) as f64
	}

	pub fn hash_id(&self) -> &'static str {
		"SHA-1"
	}
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Section {
	Refs,
	Logs,
}

/// Streams one immutable reftable: refs first, logs second, both in
/// strictly increasing key order, then `finish` for the footer. The
/// writer appends only; the caller renames the finished file into place.
pub struct Writer<W: Write> {
	os: OutputStream<W>,
	opts: WriterOptions,
	section: Section,
	block: Option<BlockWriter>,
	last_key: Vec<u8>,
	ref_index: IndexBuilder,
	log_index: IndexBuilder,
	/// Ids seen in the currently open ref block, resolved to the block
	/// position once it flushes.
	pending_obj_ids: Vec<ObjectId>,
	obj_refs: BTreeMap<ObjectId, Vec<u64>>,
	ref_index_position: u64,
	obj_position: u64,
	obj_id_len: u32,
	obj_index_position: u64,
	log_position: u64,
	log_index_position: u64,
	refs_end: u64,
	obj_end: u64,
	stats: WriterStats,
	finished: bool,
}

impl<W: Write> Writer<W> {
	pub fn new(sink: W, opts: WriterOptions) -> Result<Writer<W>> {
		opts.validate()?;
		let mut os = OutputStream::new(sink, opts.alignment());
		os.write_file_header(&header_bytes(&opts));
		let stats = WriterStats {
			block_size: opts.block_size,
			restart_interval: opts.restart_interval,
			min_update_index: opts.min_update_index,
			max_update_index: opts.max_update_index,
			..Default::default()
		};
		Ok(Writer {
			os,
			opts,
			section: Section::Refs,
			block: None,
			last_key: Vec::new(),
			ref_index: IndexBuilder::new(),
			log_index: IndexBuilder::new(),
			pending_obj_ids: Vec::new(),
			obj_refs: BTreeMap::new(),
			ref_index_position: 0,
			obj_position: 0,
			obj_id_len: 0,
			obj_index_position: 0,
			log_position: 0,
			log_index_position: 0,
			refs_end: 0,
			obj_end: 0,
			stats,
			finished: false,
		})
	}

	/// The 24 bytes ceded to the file header when the next block is the
	/// first of the file.
	fn block_share(&self) -> u32 {
		if self.os.flushed() == 0 {
			FILE_HEADER_LEN as u32
		} else {
			0
		}
	}

	pub fn add_ref(&mut self, rec: &RefRecord) -> Result<()> {
		if self.finished {
			return Err(Error::Closed);
		}
		if self.section != Section::Refs {
			return Err(Error::OutOfOrderKey);
		}
		rec.validate()?;
		let key = rec.name().as_bytes().to_vec();
		if !self.last_key.is_empty() && key <= self.last_key {
			return Err(Error::OutOfOrderKey);
		}
		let mut value = Vec::new();
		rec.encode_value(&mut value);
		self.add_entry(REF_BLOCK, &key, rec.type_bits(), &value)?;
		self.last_key = key;
		self.stats.refs += 1;
		if self.opts.index_objects {
			if let Some(id) = rec.object_id() {
				self.pending_obj_ids.push(*id);
			}
		}
		Ok(())
	}

	pub fn add_log(&mut self, rec: &LogRecord) -> Result<()> {
		if self.finished {
			return Err(Error::Closed);
		}
		if !is_valid_ref_name(&rec.name) {
			return Err(Error::InvalidRef(format!("bad ref name {:?}", rec.name)));
		}
		if self.section != Section::Logs {
			self.finish_ref_section()?;
			self.section = Section::Logs;
			self.last_key.clear();
		}
		let key = rec.key();
		if !self.last_key.is_empty() && key <= self.last_key {
			return Err(Error::OutOfOrderKey);
		}
		let mut value = Vec::new();
		rec.encode_value(&mut value);
		self.add_entry(LOG_BLOCK, &key, 0, &value)?;
		self.last_key = key;
		self.stats.logs += 1;
		Ok(())
	}

	fn add_entry(&mut self, block_type: u8, key: &[u8], type_bits: u8, value: &[u8]) -> Result<()> {
		if self.block.is_none() {
			self.block = Some(BlockWriter::new(
				block_type,
				self.opts.block_size,
				self.block_share(),
				self.opts.restart_interval,
			));
		}
		if !self.block.as_mut().unwrap().try_add(key, type_bits, value)? {
			self.flush_data_block()?;
			self.block = Some(BlockWriter::new(
				block_type,
				self.opts.block_size,
				self.block_share(),
				self.opts.restart_interval,
			));
			if !self.block.as_mut().unwrap().try_add(key, type_bits, value)? {
				// try_add on an empty block either accepts or reports
				// the minimum size; it never declines.
				unreachable!()
			}
		}
		Ok(())
	}

	fn flush_data_block(&mut self) -> Result<()> {
		let bw = match self.block.take() {
			Some(bw) if !bw.is_empty() => bw,
			_ => return Ok(()),
		};
		let position = bw.write_to(&mut self.os)?;
		match self.section {
			Section::Refs => {
				self.ref_index.add(bw.last_key(), position);
				self.stats.ref_blocks += 1;
				for id in self.pending_obj_ids.drain(..) {
					self.obj_refs.entry(id).or_insert_with(Vec::new).push(position);
				}
			}
			Section::Logs => {
				if self.log_position == 0 {
					self.log_position = position;
				}
				self.log_index.add(bw.last_key(), position);
				self.stats.log_blocks += 1;
			}
		}
		log::trace!(
			target: "reftable",
			"Flushed {} block at {}, {} entries",
			if self.section == Section::Refs { "ref" } else { "log" },
			position,
			bw.entry_count(),
		);
		Ok(())
	}

	fn ref_index_threshold(&self) -> usize {
		if self.opts.alignment() > 1 {
			ALIGNED_REF_INDEX_THRESHOLD
		} else {
			1
		}
	}

	fn finish_ref_section(&mut self) -> Result<()> {
		self.flush_data_block()?;
		let ref_index_threshold = self.ref_index_threshold();
		if let Some(info) = self.ref_index.write(
			&mut self.os,
			self.opts.block_size,
			self.opts.restart_interval,
			ref_index_threshold,
		)? {
			self.ref_index_position = info.position;
			self.stats.ref_index_keys = info.keys;
			self.stats.ref_index_bytes = info.bytes;
			self.stats.ref_index_levels = info.levels;
		}
		self.refs_end = self.os.offset();
		if self.opts.index_objects && !self.obj_refs.is_empty() {
			self.write_obj_section()?;
		}
		self.obj_end = self.os.offset();
		Ok(())
	}

	fn write_obj_section(&mut self) -> Result<()> {
		let mut ids: Vec<(ObjectId, Vec<u64>)> = std::mem::take(&mut self.obj_refs)
			.into_iter()
			.collect();
		for (_, positions) in ids.iter_mut() {
			positions.sort_unstable();
			positions.dedup();
		}
		let mut id_len = MIN_OBJ_ID_PREFIX;
		while id_len < OBJECT_ID_LEN
			&& ids.windows(2).any(|w| w[0].0[..id_len] == w[1].0[..id_len])
		{
			id_len += 1;
		}
		self.obj_id_len = id_len as u32;
		self.stats.obj_id_len = id_len as u32;
		self.stats.obj_index_keys = ids.len() as u32;

		let mut obj_index = IndexBuilder::new();
		let mut bw = BlockWriter::new(
			OBJ_BLOCK,
			self.opts.block_size,
			0,
			self.opts.restart_interval,
		);
		let mut value = Vec::new();
		for (id, positions) in &ids {
			value.clear();
			put_varint(&mut value, positions.len() as u64);
			let mut last = 0u64;
			for (i, p) in positions.iter().enumerate() {
				put_varint(&mut value, if i == 0 { *p } else { *p - last });
				last = *p;
			}
			if !bw.try_add(&id[..id_len], 0, &value)? {
				let position = bw.write_to(&mut self.os)?;
				if self.obj_position == 0 {
					self.obj_position = position;
				}
				obj_index.add(bw.last_key(), position);
				self.stats.obj_blocks += 1;
				bw = BlockWriter::new(
					OBJ_BLOCK,
					self.opts.block_size,
					0,
					self.opts.restart_interval,
				);
				if !bw.try_add(&id[..id_len], 0, &value)? {
					unreachable!()
				}
			}
		}
		if !bw.is_empty() {
			let position = bw.write_to(&mut self.os)?;
			if self.obj_position == 0 {
				self.obj_position = position;
			}
			obj_index.add(bw.last_key(), position);
			self.stats.obj_blocks += 1;
		}
		if let Some(info) = obj_index.write(
			&mut self.os,
			self.opts.block_size,
			self.opts.restart_interval,
			1,
		)? {
			self.obj_index_position = info.position;
			self.stats.obj_index_bytes = info.bytes;
		}
		log::debug!(
			target: "reftable",
			"Wrote object index: {} ids at prefix length {}",
			ids.len(),
			id_len,
		);
		Ok(())
	}

	/// Completes the table: closes the open section, writes the indices
	/// and the CRC-carrying footer. The writer rejects further records.
	pub fn finish(&mut self) -> Result<WriterStats> {
		if self.finished {
			return Err(Error::Closed);
		}
		match self.section {
			Section::Refs => self.finish_ref_section()?,
			Section::Logs => {
				self.flush_data_block()?;
				if let Some(info) = self.log_index.write(
					&mut self.os,
					self.opts.block_size,
					self.opts.restart_interval,
					1,
				)? {
					self.log_index_position = info.position;
				}
			}
		}
		let logs_end = self.os.offset();

		let mut footer = Vec::with_capacity(FILE_FOOTER_LEN);
		footer.extend_from_slice(&header_bytes(&self.opts));
		footer.extend_from_slice(&self.ref_index_position.to_be_bytes());
		let obj_word = if self.obj_position == 0 {
			0
		} else {
			(self.obj_position << 5) | u64::from(self.obj_id_len)
		};
		footer.extend_from_slice(&obj_word.to_be_bytes());
		footer.extend_from_slice(&self.obj_index_position.to_be_bytes());
		footer.extend_from_slice(&self.log_position.to_be_bytes());
		footer.extend_from_slice(&self.log_index_position.to_be_bytes());
		let mut hasher = crc32fast::Hasher::new();
		hasher.update(&footer);
		footer.extend_from_slice(&hasher.finalize().to_be_bytes());

		self.stats.total_bytes = self.os.finish(&footer)?;
		self.stats.padding_bytes = self.os.padding();
		self.stats.ref_bytes = self.refs_end.saturating_sub(FILE_HEADER_LEN as u64);
		self.stats.obj_bytes = self.obj_end - self.refs_end;
		self.stats.log_bytes = if self.log_position == 0 {
			0
		} else {
			logs_end - self.log_position
		};
		self.finished = true;
		log::debug!(
			target: "reftable",
			"Finished reftable: {} refs, {} logs, {} bytes",
			self.stats.refs,
			self.stats.logs,
			self.stats.total_bytes,
		);
		Ok(self.stats.clone())
	}

	pub fn stats(&self) -> &WriterStats {
		&self.stats
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::record::ZERO_ID;

	pub fn id(n: u64) -> ObjectId {
		let mut id = ZERO_ID;
		id[12..].copy_from_slice(&n.to_be_bytes());
		id
	}

	fn direct(name: &str, n: u64) -> RefRecord {
		RefRecord::Direct { name: name.into(), id: id(n) }
	}

	#[test]
	fn empty_table_is_92_bytes() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		let stats = w.finish().unwrap();
		assert_eq!(stats.total_bytes, 92);
		assert_eq!(out.len(), 92);
		assert_eq!(&out[0..4], &FILE_MAGIC);
		assert_eq!(out[4], VERSION_1);
		// Footer repeats the header.
		assert_eq!(&out[24..48], &out[0..24]);
		// Stored CRC covers the footer bytes before it.
		let mut hasher = crc32fast::Hasher::new();
		hasher.update(&out[24..88]);
		assert_eq!(&out[88..92], &hasher.finalize().to_be_bytes());
	}

	#[test]
	fn rejects_out_of_order_refs() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		w.add_ref(&direct("refs/heads/b", 1)).unwrap();
		assert!(matches!(
			w.add_ref(&direct("refs/heads/a", 2)),
			Err(Error::OutOfOrderKey)
		));
		assert!(matches!(
			w.add_ref(&direct("refs/heads/b", 3)),
			Err(Error::OutOfOrderKey)
		));
	}

	#[test]
	fn rejects_refs_after_logs() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		w.add_log(&LogRecord {
			name: "refs/heads/master".into(),
			time: 1000,
			old_id: id(0),
			new_id: id(1),
			tz_offset: 0,
			who_name: "t".into(),
			who_email: "t@example.com".into(),
			message: "m".into(),
		})
		.unwrap();
		assert!(matches!(
			w.add_ref(&direct("refs/heads/a", 1)),
			Err(Error::OutOfOrderKey)
		));
	}

	#[test]
	fn rejects_invalid_records() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		assert!(matches!(
			w.add_ref(&RefRecord::PeeledTag {
				name: "refs/tags/v1".into(),
				id: id(1),
				peeled: ZERO_ID,
			}),
			Err(Error::InvalidRef(_))
		));
		assert!(matches!(
			w.add_ref(&direct("refs//bad", 1)),
			Err(Error::InvalidRef(_))
		));
	}

	#[test]
	fn finish_is_single_shot() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		w.finish().unwrap();
		assert!(matches!(w.finish(), Err(Error::Closed)));
		assert!(matches!(w.add_ref(&direct("refs/heads/a", 1)), Err(Error::Closed)));
	}

	#[test]
	fn stats_count_sections() {
		let mut out = Vec::new();
		let mut w = Writer::new(&mut out, WriterOptions::default()).unwrap();
		for i in 0..100u64 {
			w.add_ref(&direct(&format!("refs/heads/{:03}", i), i)).unwrap();
		}
		let stats = w.finish().unwrap();
		assert_eq!(stats.refs, 100);
		assert_eq!(stats.logs, 0);
		assert_eq!(stats.ref_blocks, 1);
		assert_eq!(stats.log_blocks, 0);
		assert_eq!(stats.hash_id(), "SHA-1");
		assert!(stats.avg_block_fill() > 0.0);
		assert_eq!(stats.total_bytes, out.len() as u64);
	}
}
