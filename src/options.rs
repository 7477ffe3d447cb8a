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

use crate::error::{Error, Result};

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_RESTART_INTERVAL: u16 = 16;
pub const MIN_BLOCK_SIZE: u32 = 512;
/// The block length word is a u24.
pub const MAX_BLOCK_SIZE: u32 = (1 << 24) - 1;

/// Writer configuration.
#[derive(Clone, Debug)]
pub struct WriterOptions {
	pub block_size: u32,
	/// Every Nth entry of a block is stored with its full key.
	pub restart_interval: u16,
	/// Update index range stamped into header and footer.
	pub min_update_index: u64,
	pub max_update_index: u64,
	/// Emit the object-id section mapping ids back to their refs.
	pub index_objects: bool,
	/// Blocks are padded to this multiple; defaults to `block_size`.
	pub alignment: Option<u32>,
}

impl Default for WriterOptions {
	fn default() -> WriterOptions {
		WriterOptions {
			block_size: DEFAULT_BLOCK_SIZE,
			restart_interval: DEFAULT_RESTART_INTERVAL,
			min_update_index: 0,
			max_update_index: 0,
			index_objects: false,
			alignment: None,
		}
	}
}

impl WriterOptions {
	pub fn alignment(&self) -> u32 {
		self.alignment.unwrap_or(self.block_size)
	}

	pub fn validate(&self) -> Result<()> {
		if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
			return Err(Error::InvalidConfiguration(format!(
				"block size {} outside {}..={}",
				self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE,
			)));
		}
		if self.restart_interval == 0 {
			return Err(Error::InvalidConfiguration("restart interval must be >= 1".into()));
		}
		if self.min_update_index > self.max_update_index {
			return Err(Error::InvalidConfiguration(format!(
				"min update index {} > max {}",
				self.min_update_index, self.max_update_index,
			)));
		}
		let alignment = self.alignment();
		if alignment == 0 || alignment > self.block_size {
			return Err(Error::InvalidConfiguration(format!(
				"alignment {} outside 1..={}",
				alignment, self.block_size,
			)));
		}
		Ok(())
	}
}
