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

// Reference and reflog records.
//
// Ref record, keyed by the full reference name:
// type 0: deletion tombstone, no value
// type 1: direct reference       [id: 20]
// type 2: annotated tag          [id: 20][peeled: 20]
// type 3: symbolic reference     [target_len: varint][target]
//
// Log record, keyed by <refname> 0x00 <0xffffffff - unix_seconds: u32 BE>
// so that entries group by ref and order newest-first within a ref:
// [old: 20][new: 20][tz_minutes: i16 BE]
// [name_len: varint][name][email_len: varint][email][msg_len: varint][msg]

use crate::codec::{put_varint, read_varint};
use crate::error::{Error, Result};

pub const OBJECT_ID_LEN: usize = 20;

pub type ObjectId = [u8; OBJECT_ID_LEN];

pub const ZERO_ID: ObjectId = [0u8; OBJECT_ID_LEN];

pub const REF_DELETION: u8 = 0;
pub const REF_DIRECT: u8 = 1;
pub const REF_PEELED_TAG: u8 = 2;
pub const REF_SYMBOLIC: u8 = 3;

/// One reference record. Variants map one-to-one onto the 2-bit type
/// field of the on-disk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefRecord {
	Deletion { name: String },
	Direct { name: String, id: ObjectId },
	PeeledTag { name: String, id: ObjectId, peeled: ObjectId },
	Symbolic { name: String, target: String },
}

impl RefRecord {
	pub fn name(&self) -> &str {
		match self {
			RefRecord::Deletion { name }
			| RefRecord::Direct { name, .. }
			| RefRecord::PeeledTag { name, .. }
			| RefRecord::Symbolic { name, .. } => name,
		}
	}

	pub fn type_bits(&self) -> u8 {
		match self {
			RefRecord::Deletion { .. } => REF_DELETION,
			RefRecord::Direct { .. } => REF_DIRECT,
			RefRecord::PeeledTag { .. } => REF_PEELED_TAG,
			RefRecord::Symbolic { .. } => REF_SYMBOLIC,
		}
	}

	pub fn is_deletion(&self) -> bool {
		matches!(self, RefRecord::Deletion { .. })
	}

	pub fn is_symbolic(&self) -> bool {
		matches!(self, RefRecord::Symbolic { .. })
	}

	/// The object id this reference points at, if it points at one.
	pub fn object_id(&self) -> Option<&ObjectId> {
		match self {
			RefRecord::Direct { id, .. } | RefRecord::PeeledTag { id, .. } => Some(id),
			_ => None,
		}
	}

	pub fn peeled_id(&self) -> Option<&ObjectId> {
		match self {
			RefRecord::PeeledTag { peeled, .. } => Some(peeled),
			_ => None,
		}
	}

	pub fn symbolic_target(&self) -> Option<&str> {
		match self {
			RefRecord::Symbolic { target, .. } => Some(target),
			_ => None,
		}
	}

	/// Checks the invariants a record must satisfy before it may be
	/// written: a well-formed name, a non-zero peeled id on tags, and a
	/// well-formed target on symbolic refs.
	pub fn validate(&self) -> Result<()> {
		if !is_valid_ref_name(self.name()) {
			return Err(Error::InvalidRef(format!("bad ref name {:?}", self.name())));
		}
		match self {
			RefRecord::PeeledTag { name, peeled, .. } if *peeled == ZERO_ID =>
				Err(Error::InvalidRef(format!("{:?} has a zero peeled id", name))),
			RefRecord::Symbolic { name, target } if !is_valid_ref_name(target) =>
				Err(Error::InvalidRef(format!("{:?} targets bad ref name {:?}", name, target))),
			_ => Ok(()),
		}
	}

	pub fn encode_value(&self, out: &mut Vec<u8>) {
		match self {
			RefRecord::Deletion { .. } => (),
			RefRecord::Direct { id, .. } => out.extend_from_slice(id),
			RefRecord::PeeledTag { id, peeled, .. } => {
				out.extend_from_slice(id);
				out.extend_from_slice(peeled);
			}
			RefRecord::Symbolic { target, .. } => {
				put_varint(out, target.len() as u64);
				out.extend_from_slice(target.as_bytes());
			}
		}
	}

	/// Decodes the value of a ref entry whose key and type bits are
	/// already known. `None` means the bytes are inconsistent; the block
	/// reader turns that into a malformed-block error with offsets.
	pub fn decode_value(type_bits: u8, key: &[u8], buf: &[u8], pos: &mut usize) -> Option<RefRecord> {
		let name = String::from_utf8(key.to_vec()).ok()?;
		match type_bits {
			REF_DELETION => Some(RefRecord::Deletion { name }),
			REF_DIRECT => {
				let id = read_id(buf, pos)?;
				Some(RefRecord::Direct { name, id })
			}
			REF_PEELED_TAG => {
				let id = read_id(buf, pos)?;
				let peeled = read_id(buf, pos)?;
				Some(RefRecord::PeeledTag { name, id, peeled })
			}
			REF_SYMBOLIC => {
				let target = read_str(buf, pos)?;
				Some(RefRecord::Symbolic { name, target })
			}
			_ => None,
		}
	}
}

/// One reflog record. The timestamp lives in the key on disk; the value
/// carries ids, timezone and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
	pub name: String,
	/// Unix time of the update, seconds.
	pub time: u32,
	pub old_id: ObjectId,
	pub new_id: ObjectId,
	/// Timezone offset in minutes from UTC.
	pub tz_offset: i16,
	pub who_name: String,
	pub who_email: String,
	pub message: String,
}

impl LogRecord {
	pub fn key(&self) -> Vec<u8> {
		log_key(&self.name, self.time)
	}

	pub fn encode_value(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.old_id);
		out.extend_from_slice(&self.new_id);
		out.extend_from_slice(&self.tz_offset.to_be_bytes());
		put_varint(out, self.who_name.len() as u64);
		out.extend_from_slice(self.who_name.as_bytes());
		put_varint(out, self.who_email.len() as u64);
		out.extend_from_slice(self.who_email.as_bytes());
		put_varint(out, self.message.len() as u64);
		out.extend_from_slice(self.message.as_bytes());
	}

	pub fn decode(key: &[u8], buf: &[u8], pos: &mut usize) -> Option<LogRecord> {
		let (name, time) = split_log_key(key)?;
		let old_id = read_id(buf, pos)?;
		let new_id = read_id(buf, pos)?;
		if *pos + 2 > buf.len() {
			return None;
		}
		let tz_offset = i16::from_be_bytes([buf[*pos], buf[*pos + 1]]);
		*pos += 2;
		let who_name = read_str(buf, pos)?;
		let who_email = read_str(buf, pos)?;
		let message = read_str(buf, pos)?;
		Some(LogRecord { name, time, old_id, new_id, tz_offset, who_name, who_email, message })
	}
}

/// Big-endian reversed timestamp, so that newer entries sort first.
pub fn reverse_time(time: u32) -> u32 {
	0xffff_ffff - time
}

/// Composite log key: name, NUL, reversed time.
pub fn log_key(name: &str, time: u32) -> Vec<u8> {
	let mut key = Vec::with_capacity(name.len() + 5);
	key.extend_from_slice(name.as_bytes());
	key.push(0);
	key.extend_from_slice(&reverse_time(time).to_be_bytes());
	key
}

fn split_log_key(key: &[u8]) -> Option<(String, u32)> {
	if key.len() < 5 {
		return None;
	}
	let (name, tail) = key.split_at(key.len() - 5);
	if tail[0] != 0 {
		return None;
	}
	let rev = u32::from_be_bytes([tail[1], tail[2], tail[3], tail[4]]);
	let name = String::from_utf8(name.to_vec()).ok()?;
	Some((name, reverse_time(rev)))
}

fn read_id(buf: &[u8], pos: &mut usize) -> Option<ObjectId> {
	if *pos + OBJECT_ID_LEN > buf.len() {
		return None;
	}
	let mut id = ZERO_ID;
	id.copy_from_slice(&buf[*pos..*pos + OBJECT_ID_LEN]);
	*pos += OBJECT_ID_LEN;
	Some(id)
}

fn read_str(buf: &[u8], pos: &mut usize) -> Option<String> {
	let len = read_varint(buf, pos)? as usize;
	if *pos + len > buf.len() {
		return None;
	}
	let s = String::from_utf8(buf[*pos..*pos + len].to_vec()).ok()?;
	*pos += len;
	Some(s)
}

/// Practical reference-name well-formedness: non-empty slash-separated
/// components, no empty, `.` or `..` components, no control bytes or
/// spaces, no component ending in `.lock`.
pub fn is_valid_ref_name(name: &str) -> bool {
	if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
		return false;
	}
	if name.bytes().any(|b| b < 0x20 || b == 0x7f || b == b' ') {
		return false;
	}
	for component in name.split('/') {
		if component.is_empty() || component == "." || component == ".." {
			return false;
		}
		if component.ends_with(".lock") {
			return false;
		}
	}
	true
}
