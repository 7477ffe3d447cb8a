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

use crate::codec;
use crate::error::Result;

/// Append-only, block-buffered output stream. One block is accumulated
/// in memory at a time; `flush_block` backpatches the length word, pads
/// the block to the alignment multiple and hands it to the sink.
///
/// The 24-byte file header is written into the same buffer as the first
/// block, so the first block of a file starts at offset 24 and has 24
/// bytes less capacity than the rest.
pub struct OutputStream<W: Write> {
	sink: W,
	/// Bytes already handed to the sink.
	flushed: u64,
	buf: Vec<u8>,
	/// Offset of the current block's tag byte within `buf`.
	tag_pos: usize,
	in_block: bool,
	alignment: u32,
	padding: u64,
}

impl<W: Write> OutputStream<W> {
	pub fn new(sink: W, alignment: u32) -> OutputStream<W> {
		OutputStream {
			sink,
			flushed: 0,
			buf: Vec::new(),
			tag_pos: 0,
			in_block: false,
			alignment,
			padding: 0,
		}
	}

	/// Current file write position.
	pub fn offset(&self) -> u64 {
		self.flushed + self.buf.len() as u64
	}

	pub fn flushed(&self) -> u64 {
		self.flushed
	}

	/// Total zero padding emitted by block flushes so far.
	pub fn padding(&self) -> u64 {
		self.padding
	}

	/// Offset of the next byte relative to the current block's tag.
	pub fn block_offset(&self) -> u32 {
		debug_assert!(self.in_block);
		(self.buf.len() - self.tag_pos) as u32
	}

	pub fn write_file_header(&mut self, header: &[u8]) {
		debug_assert_eq!(self.offset(), 0);
		self.buf.extend_from_slice(header);
	}

	pub fn begin_block(&mut self, tag: u8) {
		debug_assert!(!self.in_block);
		self.tag_pos = self.buf.len();
		self.buf.push(tag);
		self.buf.extend_from_slice(&[0; 3]);
		self.in_block = true;
	}

	pub fn write_raw(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	pub fn write_u16(&mut self, v: u16) {
		self.buf.extend_from_slice(&v.to_be_bytes());
	}

	pub fn write_u32(&mut self, v: u32) {
		self.buf.extend_from_slice(&v.to_be_bytes());
	}

	pub fn write_varint(&mut self, v: u64) {
		codec::put_varint(&mut self.buf, v);
	}

	/// Finalizes the current block: fills in the length word, pads to
	/// the alignment multiple and flushes. Returns the file position of
	/// the block's tag byte.
	pub fn flush_block(&mut self) -> Result<u64> {
		debug_assert!(self.in_block);
		let position = self.flushed + self.tag_pos as u64;
		let body_len = (self.buf.len() - self.tag_pos) as u32;
		debug_assert!(body_len < 1 << 24);
		let len_bytes = body_len.to_be_bytes();
		self.buf[self.tag_pos + 1..self.tag_pos + 4].copy_from_slice(&len_bytes[1..]);

		let alignment = self.alignment as u64;
		let end = self.flushed + self.buf.len() as u64;
		let padded_end = (end + alignment - 1) / alignment * alignment;
		self.padding += padded_end - end;
		self.buf.resize((padded_end - self.flushed) as usize, 0);

		self.sink.write_all(&self.buf)?;
		self.flushed += self.buf.len() as u64;
		self.buf.clear();
		self.tag_pos = 0;
		self.in_block = false;
		Ok(position)
	}

	/// Flushes whatever is buffered (the bare header, when no block was
	/// ever written), appends the footer and returns the total file size.
	pub fn finish(&mut self, footer: &[u8]) -> Result<u64> {
		debug_assert!(!self.in_block);
		if !self.buf.is_empty() {
			self.sink.write_all(&self.buf)?;
			self.flushed += self.buf.len() as u64;
			self.buf.clear();
		}
		self.sink.write_all(footer)?;
		self.flushed += footer.len() as u64;
		self.sink.flush()?;
		Ok(self.flushed)
	}
}
