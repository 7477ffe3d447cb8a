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

// An ordered stack of reftables in one directory.
//
// tables.list - manifest, one table file name per line, oldest first,
// trailing newline. Replaced atomically (write temp, rename) under an
// exclusive lock on tables.list.lck. Readers of the stack tolerate a
// missing manifest (empty stack); a manifest naming an unopenable file
// is corruption.
//
// Tables themselves are immutable; the only mutations are appending a
// new table and replacing a contiguous suffix with its compaction.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::merge::MergedReftable;
use crate::options::WriterOptions;
use crate::reader::Reader;
use crate::source::{FileSource, MemSource};
use crate::writer::Writer;
use crate::{LogCursor, RefCursor};

const MANIFEST_NAME: &str = "tables.list";
const MANIFEST_TMP: &str = "tables.list.tmp";
const LOCK_NAME: &str = "tables.list.lck";

struct StackTable {
	name: String,
	reader: Reader<FileSource>,
	bytes: u64,
}

/// Ordered collection of reftables; index 0 is oldest. The merged view
/// of the stack is the logical ref database.
pub struct Stack {
	dir: PathBuf,
	tables: Vec<StackTable>,
}

impl Stack {
	/// Opens the stack in `dir`. A missing manifest is an empty stack;
	/// a manifest entry that cannot be opened is `StackCorrupt`.
	pub fn open(dir: &Path) -> Result<Stack> {
		let mut tables = Vec::new();
		match std::fs::read_to_string(dir.join(MANIFEST_NAME)) {
			Ok(content) => {
				for line in content.lines() {
					let line = line.trim();
					if line.is_empty() {
						continue;
					}
					let source = FileSource::open(&dir.join(line)).map_err(|e| {
						Error::StackCorrupt(format!("cannot open table {}: {}", line, e))
					})?;
					let reader = Reader::open(source).map_err(|e| {
						Error::StackCorrupt(format!("cannot read table {}: {}", line, e))
					})?;
					let bytes = reader.size();
					tables.push(StackTable { name: line.to_string(), reader, bytes });
				}
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
			Err(e) => return Err(e.into()),
		}
		log::debug!(target: "reftable", "Opened stack at {:?} with {} tables", dir, tables.len());
		Ok(Stack { dir: dir.to_path_buf(), tables })
	}

	pub fn table_count(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	pub fn total_bytes(&self) -> u64 {
		self.tables.iter().map(|t| t.bytes).sum()
	}

	pub fn table_names(&self) -> Vec<&str> {
		self.tables.iter().map(|t| t.name.as_str()).collect()
	}

	pub fn readers(&self) -> Vec<&Reader<FileSource>> {
		self.tables.iter().map(|t| &t.reader).collect()
	}

	/// Single logical view over the whole stack, newest table winning.
	pub fn merged(&self) -> MergedReftable<FileSource> {
		MergedReftable::new(self.readers())
	}

	fn lock(&self) -> Result<std::fs::File> {
		let lock = std::fs::OpenOptions::new()
			.create(true)
			.write(true)
			.open(self.dir.join(LOCK_NAME))?;
		lock.lock_exclusive()?;
		Ok(lock)
	}

	fn write_manifest(&self, names: &[String]) -> Result<()> {
		let tmp = self.dir.join(MANIFEST_TMP);
		{
			let mut file = std::fs::File::create(&tmp)?;
			for name in names {
				file.write_all(name.as_bytes())?;
				file.write_all(b"\n")?;
			}
			file.sync_data()?;
		}
		std::fs::rename(&tmp, self.dir.join(MANIFEST_NAME))?;
		Ok(())
	}

	fn write_table_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
		let tmp = self.dir.join(format!("{}.tmp", name));
		{
			let mut file = std::fs::File::create(&tmp)?;
			file.write_all(bytes)?;
			file.sync_data()?;
		}
		std::fs::rename(&tmp, self.dir.join(name))?;
		Ok(())
	}

	fn new_table_name(min: u64, max: u64) -> String {
		use rand::Rng;
		let suffix: u32 = rand::thread_rng().gen();
		format!("{:016x}-{:016x}-{:08x}.ref", min, max, suffix)
	}

	fn push_table(&mut self, name: String) -> Result<()> {
		let source = FileSource::open(&self.dir.join(&name))
			.map_err(|e| Error::StackCorrupt(format!("cannot open table {}: {}", name, e)))?;
		let reader = Reader::open(source)
			.map_err(|e| Error::StackCorrupt(format!("cannot read table {}: {}", name, e)))?;
		let bytes = reader.size();
		self.tables.push(StackTable { name, reader, bytes });
		Ok(())
	}

	/// Appends a finished table (the byte image a `Writer` produced),
	/// then applies the auto-compaction rule. The image is validated
	/// before anything touches disk.
	pub fn add(&mut self, table: Vec<u8>) -> Result<()> {
		let probe = Reader::open(MemSource::new(table))?;
		let min = probe.min_update_index();
		let max = probe.max_update_index();
		let table = probe.into_source().into_inner();
		let name = Self::new_table_name(min, max);
		{
			let _lock = self.lock()?;
			self.write_table_file(&name, &table)?;
			let mut names: Vec<String> = self.tables.iter().map(|t| t.name.clone()).collect();
			names.push(name.clone());
			self.write_manifest(&names)?;
		}
		self.push_table(name)?;
		log::debug!(
			target: "reftable",
			"Added table {}..{} to stack, {} tables",
			min,
			max,
			self.tables.len(),
		);
		self.auto_compact()
	}

	/// Replaces `tables[from..]` with a single merged table spanning
	/// their update indices. Tombstones survive unless the suffix
	/// starts at the stack base, where nothing older remains for them
	/// to shadow.
	pub fn compact_range(&mut self, from: usize) -> Result<()> {
		if from >= self.tables.len() || self.tables.len() - from < 2 {
			return Ok(());
		}
		let min = self.tables[from].reader.min_update_index();
		let max = self.tables.last().unwrap().reader.max_update_index();
		let mut buf = Vec::new();
		{
			let mut options = WriterOptions::default();
			options.min_update_index = min;
			options.max_update_index = max;
			let mut writer = Writer::new(&mut buf, options)?;
			let readers: Vec<&Reader<FileSource>> =
				self.tables[from..].iter().map(|t| &t.reader).collect();
			let mut merged = MergedReftable::new(readers);
			merged.set_include_deletes(true);
			let mut refs = merged.all_refs()?;
			while let Some(rec) = refs.next()? {
				if rec.is_deletion() && from == 0 {
					continue;
				}
				writer.add_ref(&rec)?;
			}
			let mut logs = merged.all_logs()?;
			while let Some(rec) = logs.next()? {
				writer.add_log(&rec)?;
			}
			writer.finish()?;
		}
		let name = Self::new_table_name(min, max);
		{
			let _lock = self.lock()?;
			self.write_table_file(&name, &buf)?;
			let mut names: Vec<String> =
				self.tables[..from].iter().map(|t| t.name.clone()).collect();
			names.push(name.clone());
			self.write_manifest(&names)?;
		}
		let replaced = self.tables.split_off(from);
		self.push_table(name)?;
		for table in replaced {
			let path = self.dir.join(&table.name);
			drop(table);
			if let Err(e) = std::fs::remove_file(&path) {
				log::warn!(target: "reftable", "Leaving stale table {:?}: {}", path, e);
			}
		}
		log::info!(
			target: "reftable",
			"Compacted stack suffix at {}, now {} tables",
			from,
			self.tables.len(),
		);
		Ok(())
	}

	/// Collapses the whole stack to one table, dropping tombstones.
	pub fn compact_all(&mut self) -> Result<()> {
		self.compact_range(0)
	}

	/// Geometric rule: repeatedly compact the longest suffix whose byte
	/// total is at most twice the size of the table just before it,
	/// keeping the stack depth logarithmic in the number of updates.
	fn auto_compact(&mut self) -> Result<()> {
		loop {
			let sizes: Vec<u64> = self.tables.iter().map(|t| t.bytes).collect();
			let mut pick = None;
			for from in 1..sizes.len() {
				if sizes.len() - from < 2 {
					break;
				}
				let total: u64 = sizes[from..].iter().sum();
				if total <= 2 * sizes[from - 1] {
					pick = Some(from);
					break;
				}
			}
			match pick {
				Some(from) => self.compact_range(from)?,
				None => return Ok(()),
			}
		}
	}
}
