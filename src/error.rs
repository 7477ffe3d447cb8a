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

#[derive(Debug)]
pub enum Error {
	Io(std::io::Error),
	/// Bad magic or unsupported version in the file header.
	MalformedHeader(String),
	/// Bad magic, bad length or CRC mismatch in the file footer.
	MalformedFooter(String),
	/// A block failed to parse. Carries the file position of the block
	/// and the in-block offset of the offending entry.
	MalformedBlock { position: u64, offset: u32, reason: String },
	/// Writer input keys were not strictly increasing.
	OutOfOrderKey,
	/// A single entry does not fit the configured block size. The payload
	/// is the minimum block size that would have accepted it.
	BlockSizeTooSmall(u32),
	/// A record violates reference well-formedness rules.
	InvalidRef(String),
	/// Writer options fail validation.
	InvalidConfiguration(String),
	/// Use after `close` or `finish`.
	Closed,
	/// A sub-cursor of a merged view failed. Carries the index of the
	/// failing reader in the stack and the underlying cause.
	MergeSourceFailed(usize, Box<Error>),
	/// The stack manifest references a table that cannot be opened.
	StackCorrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::Io(e)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::Io(e) => write!(f, "IO Error: {}", e),
			Error::MalformedHeader(m) => write!(f, "Malformed header: {}", m),
			Error::MalformedFooter(m) => write!(f, "Malformed footer: {}", m),
			Error::MalformedBlock { position, offset, reason } =>
				write!(f, "Malformed block at {}+{}: {}", position, offset, reason),
			Error::OutOfOrderKey => write!(f, "Keys must be written in strictly increasing order"),
			Error::BlockSizeTooSmall(min) => write!(f, "Entry requires a block size of at least {}", min),
			Error::InvalidRef(m) => write!(f, "Invalid reference: {}", m),
			Error::InvalidConfiguration(m) => write!(f, "Invalid configuration: {}", m),
			Error::Closed => write!(f, "Use after close"),
			Error::MergeSourceFailed(i, cause) => write!(f, "Merge source {} failed: {}", i, cause),
			Error::StackCorrupt(m) => write!(f, "Stack corrupt: {}", m),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			Error::MergeSourceFailed(_, cause) => Some(&**cause),
			_ => None,
		}
	}
}
