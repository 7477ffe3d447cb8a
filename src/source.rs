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

use crate::error::Result;

/// Random-access byte source a reader decodes blocks from. Reads must be
/// idempotent and safe to issue concurrently.
pub trait BlockSource: Send + Sync {
	/// Reads up to `len` bytes at `offset`. Returns fewer bytes when the
	/// range extends past the end of the source.
	fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>>;
	fn size(&self) -> u64;
}

/// In-memory source over an owned buffer.
pub struct MemSource(Vec<u8>);

impl MemSource {
	pub fn new(data: Vec<u8>) -> MemSource {
		MemSource(data)
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.0
	}
}

impl From<Vec<u8>> for MemSource {
	fn from(data: Vec<u8>) -> MemSource {
		MemSource(data)
	}
}

impl BlockSource for MemSource {
	fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
		let start = std::cmp::min(offset as usize, self.0.len());
		let end = std::cmp::min(start + len, self.0.len());
		Ok(self.0[start..end].to_vec())
	}

	fn size(&self) -> u64 {
		self.0.len() as u64
	}
}

#[cfg(target_os = "macos")]
fn disable_read_ahead(file: &std::fs::File) -> Result<()> {
	use std::os::unix::io::AsRawFd;
	if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, 0) } != 0 {
		Err(std::io::Error::last_os_error())?
	} else {
		Ok(())
	}
}

#[cfg(not(target_os = "macos"))]
fn disable_read_ahead(_file: &std::fs::File) -> Result<()> {
	Ok(())
}

/// File-backed source. The file is mapped once on open; block reads are
/// plain copies out of the mapping.
pub struct FileSource {
	map: memmap2::Mmap,
}

impl FileSource {
	pub fn open(path: &std::path::Path) -> Result<FileSource> {
		let file = std::fs::OpenOptions::new().read(true).open(path)?;
		disable_read_ahead(&file)?;
		let map = unsafe { memmap2::Mmap::map(&file)? };
		Ok(FileSource { map })
	}
}

impl BlockSource for FileSource {
	fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
		let start = std::cmp::min(offset as usize, self.map.len());
		let end = std::cmp::min(start + len, self.map.len());
		Ok(self.map[start..end].to_vec())
	}

	fn size(&self) -> u64 {
		self.map.len() as u64
	}
}
