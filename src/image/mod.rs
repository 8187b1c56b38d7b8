//! Sparse byte image backed by the text lines it was parsed from.
//!
//! Every programmed address remembers the line and column its two hex digits
//! live at, so overwriting a byte only regenerates that one line (digits and
//! checksum). Untouched lines are emitted exactly as they were read, each
//! with its own terminator.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use log::{debug, warn};
use thiserror::Error;

use crate::hex::{self, FormatError, Record, RecordType, DATA_START};

mod range;

pub use range::MemoryRange;

/// `MemoryImage::min_address` of an image without data.
pub const EMPTY_MIN: u32 = u32::MAX;
/// `MemoryImage::max_address` of an image without data.
pub const EMPTY_MAX: u32 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressedByte
{
	pub address: u32,
	pub value: u8,
	/// Index into the image's line table.
	pub line: usize,
	/// Offset of the first hex digit within that line.
	pub column: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TextLine
{
	Original(String),
	Patched(String),
	Deleted,
}

impl TextLine
{
	pub fn text(&self) -> Option<&str>
	{
		match self
		{
			Self::Original(text) | Self::Patched(text) => Some(text),
			Self::Deleted => None,
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEnding
{
	Lf,
	CrLf,
}

impl LineEnding
{
	pub fn as_str(&self) -> &'static str
	{
		match self
		{
			Self::Lf => "\n",
			Self::CrLf => "\r\n",
		}
	}

	/// Splits the terminator off a chunk produced by `split_inclusive('\n')`.
	fn split(chunk: &str) -> (&str, Option<Self>)
	{
		if let Some(text) = chunk.strip_suffix("\r\n") {(text, Some(Self::CrLf))}
		else if let Some(text) = chunk.strip_suffix('\n') {(text, Some(Self::Lf))}
		else {(chunk, None)}
	}
}

#[derive(Clone, Debug)]
pub struct MemoryImage
{
	lines: Vec<TextLine>,
	/// Terminator of each line, `None` for a last line without one.
	endings: Vec<Option<LineEnding>>,
	bytes: BTreeMap<u32, AddressedByte>,
	page_size: u32,
}

impl MemoryImage
{
	pub fn parse(text: &str, page_size: u32) -> Result<Self, ParseError>
	{
		if page_size == 0
		{
			return Err(ParseError::PageSize(page_size));
		}
		let mut image = Self{lines: Vec::new(), endings: Vec::new(), bytes: BTreeMap::new(), page_size};

		let mut upper = 0u32;
		let mut end_of_file = None;
		for (idx, chunk) in text.split_inclusive('\n').enumerate()
		{
			let (line, ending) = LineEnding::split(chunk);
			image.lines.push(TextLine::Original(line.to_owned()));
			image.endings.push(ending);
			if end_of_file.is_some() || line.trim().is_empty() {continue;}

			let record = Record::decode(line.trim_end()).map_err(|source| ParseError::Format{line: idx + 1, source})?;
			if !record.checksum_valid()
			{
				warn!("line {} has checksum {:02X}, expected {:02X}", idx + 1, record.checksum, record.expected_checksum());
			}
			match record.kind
			{
				RecordType::Data =>
				{
					let base = (upper << 16).checked_add(u32::from(record.offset));
					for (i, &value) in record.data.iter().enumerate()
					{
						let Some(address) = base.and_then(|b| b.checked_add(i as u32))
						else
						{
							return Err(ParseError::AddressOverflow{line: idx + 1});
						};
						let byte = AddressedByte{address, value, line: idx, column: DATA_START + 2 * i};
						if let Some(prev) = image.bytes.get(&address)
						{
							warn!("address 0x{address:08X} programmed again on line {}, keeping line {}", idx + 1, prev.line + 1);
						}
						else {image.bytes.insert(address, byte);}
					}
				},
				RecordType::ExtendedLinearAddress =>
				{
					// a zero upper half never resets the running offset
					match record.upper_address()
					{
						Some(0) | None => debug!("ignoring zero extended linear address on line {}", idx + 1),
						Some(addr) => upper = u32::from(addr),
					}
				},
				RecordType::EndOfFile => end_of_file = Some(idx),
				RecordType::Other(kind) => debug!("ignoring record type {kind:02X} on line {}", idx + 1),
			}
		}
		if let Some(eof) = end_of_file
		{
			let trailing = image.lines[eof + 1..].iter().filter_map(TextLine::text).filter(|l| !l.trim().is_empty()).count();
			if trailing > 0
			{
				warn!("{trailing} record(s) after end of file on line {} are kept but not mapped", eof + 1);
			}
		}
		debug!("parsed {} lines with {} programmed bytes", image.lines.len(), image.bytes.len());
		Ok(image)
	}

	pub fn page_size(&self) -> u32
	{
		self.page_size
	}

	/// Terminator the line at `index` was read with.
	pub fn line_ending(&self, index: usize) -> Option<LineEnding>
	{
		self.endings.get(index).copied().flatten()
	}

	/// Number of programmed addresses.
	pub fn len(&self) -> usize
	{
		self.bytes.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.bytes.is_empty()
	}

	pub fn contains(&self, addr: u32) -> bool
	{
		self.bytes.contains_key(&addr)
	}

	pub fn entry(&self, addr: u32) -> Option<&AddressedByte>
	{
		self.bytes.get(&addr)
	}

	/// Programmed addresses within `range`, ascending.
	pub fn addresses<R: RangeBounds<u32>>(&self, range: R) -> impl DoubleEndedIterator<Item = u32> + '_
	{
		self.bytes.range(range).map(|(&addr, _)| addr)
	}

	pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AddressedByte> + '_
	{
		self.bytes.values()
	}

	pub fn get_byte(&self, addr: u32) -> Result<u8, AddressError>
	{
		self.bytes.get(&addr).map(|b| b.value).ok_or(AddressError::NotFound(addr))
	}

	fn get_at(&self, addr: u32, off: u32) -> Result<u8, AddressError>
	{
		match addr.checked_add(off)
		{
			Some(addr) => self.get_byte(addr),
			None => Err(AddressError::NotFound(addr.wrapping_add(off))),
		}
	}

	/// Reads `addr` as the low and `addr + 1` as the high byte.
	pub fn get16(&self, addr: u32) -> Result<u16, AddressError>
	{
		Ok(u16::from(self.get_at(addr, 0)?) | u16::from(self.get_at(addr, 1)?) << 8)
	}

	/// Reads four bytes where `addr + i` contributes bits `8i..8i + 8`.
	pub fn get32(&self, addr: u32) -> Result<u32, AddressError>
	{
		(0..4).try_fold(0u32, |acc, i| Ok(acc | u32::from(self.get_at(addr, i)?) << (i * 8)))
	}

	/// Overwrites a programmed byte and regenerates its line, returns `false` if `addr` was never programmed.
	pub fn set_byte(&mut self, addr: u32, value: u8) -> bool
	{
		let Some(&AddressedByte{line, column, ..}) = self.bytes.get(&addr)
		else
		{
			return false;
		};
		let Some(text) = self.lines[line].text()
		else
		{
			return false;
		};
		match hex::patch_line(text, column, value)
		{
			Ok(patched) => self.lines[line] = TextLine::Patched(patched),
			Err(err) =>
			{
				warn!("cannot patch line {}: {err}", line + 1);
				return false;
			},
		}
		if let Some(byte) = self.bytes.get_mut(&addr)
		{
			byte.value = value;
		}
		true
	}

	fn set_at(&mut self, addr: u32, off: u32, value: u8) -> bool
	{
		addr.checked_add(off).is_some_and(|addr| self.set_byte(addr, value))
	}

	/// Writes the high byte to `addr + 1`, then the low byte to `addr`.
	///
	/// Stops at the first address that is not programmed; a byte written before that stays written.
	pub fn set16(&mut self, addr: u32, value: u16) -> bool
	{
		let [hi, lo] = value.to_be_bytes();
		self.set_at(addr, 1, hi) && self.set_at(addr, 0, lo)
	}

	/// Writes `value` most significant byte first in address order, starting from `addr + 3`.
	///
	/// Note that this is not the byte order `get32` reads. Like `set16` it is not transactional.
	pub fn set32(&mut self, addr: u32, value: u32) -> bool
	{
		let bytes = value.to_be_bytes();
		(0..4).rev().all(|i| self.set_at(addr, i, bytes[i as usize]))
	}

	/// Lowest programmed address, `EMPTY_MIN` without data.
	pub fn min_address(&self) -> u32
	{
		self.bytes.keys().next().copied().unwrap_or(EMPTY_MIN)
	}

	/// Highest programmed address, `EMPTY_MAX` without data.
	pub fn max_address(&self) -> u32
	{
		self.bytes.keys().next_back().copied().unwrap_or(EMPTY_MAX)
	}

	pub fn page_of(&self, addr: u32) -> u32
	{
		addr / self.page_size
	}

	pub fn page_start_address(&self, addr: u32) -> u32
	{
		self.page_of(addr) * self.page_size
	}

	pub fn page_range(&self, addr: u32) -> MemoryRange
	{
		MemoryRange::with_len(self.page_start_address(addr), self.page_size)
	}

	/// Lowest programmed address in the page of `addr`, or `max_address` if the page is blank.
	pub fn page_min_address(&self, addr: u32) -> u32
	{
		self.addresses(self.page_range(addr)).next().unwrap_or_else(|| self.max_address())
	}

	/// Highest programmed address in the page of `addr`, or `min_address` if the page is blank.
	pub fn page_max_address(&self, addr: u32) -> u32
	{
		self.addresses(self.page_range(addr)).next_back().unwrap_or_else(|| self.min_address())
	}

	pub fn is_page_blank(&self, addr: u32) -> bool
	{
		self.addresses(self.page_range(addr)).next().is_none()
	}

	pub fn line(&self, index: usize) -> Option<&TextLine>
	{
		self.lines.get(index)
	}

	pub fn line_count(&self) -> usize
	{
		self.lines.len()
	}

	/// Removes a line from the output along with the bytes it programmed.
	pub fn delete_line(&mut self, index: usize) -> bool
	{
		match self.lines.get_mut(index)
		{
			None | Some(TextLine::Deleted) => false,
			Some(line) =>
			{
				*line = TextLine::Deleted;
				self.bytes.retain(|_, b| b.line != index);
				true
			},
		}
	}

	pub fn patched_lines(&self) -> usize
	{
		self.lines.iter().filter(|l| matches!(l, TextLine::Patched(..))).count()
	}

	pub fn is_modified(&self) -> bool
	{
		self.lines.iter().any(|l| !matches!(l, TextLine::Original(..)))
	}

	/// Lines to emit, in order, without deleted ones.
	pub fn serialize(&self) -> Vec<&str>
	{
		self.lines.iter().filter_map(TextLine::text).collect()
	}

	pub fn to_text(&self) -> String
	{
		let mut out = String::new();
		for (line, &ending) in self.lines.iter().zip(&self.endings)
		{
			if let Some(text) = line.text()
			{
				out.push_str(text);
				out.push_str(ending.map_or("", |e| e.as_str()));
			}
		}
		out
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParseError
{
	#[error("invalid page size {0}")]
	PageSize(u32),
	#[error("malformed record on line {line}")]
	Format
	{
		line: usize,
		#[source]
		source: FormatError,
	},
	#[error("address overflow on line {line}")]
	AddressOverflow{line: usize},
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum AddressError
{
	#[error("address 0x{0:08X} not found")]
	NotFound(u32),
}
