//! Intel HEX record codec.
//!
//! A record line reads `:LLAAAATT[DD...]CC`: byte count, 16-bit offset, record
//! type, payload and a two's complement checksum over everything in between.

use core::fmt;

use thiserror::Error;


pub const START_CODE: u8 = b':';
/// Column of the first payload digit (the start code counts).
pub const DATA_START: usize = 9;
const HEADER_LEN: usize = DATA_START;
const CHECKSUM_LEN: usize = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordType
{
	Data,
	EndOfFile,
	ExtendedLinearAddress,
	Other(u8),
}

impl From<u8> for RecordType
{
	fn from(value: u8) -> Self
	{
		match value
		{
			0x00 => Self::Data,
			0x01 => Self::EndOfFile,
			0x04 => Self::ExtendedLinearAddress,
			other => Self::Other(other),
		}
	}
}

impl From<RecordType> for u8
{
	fn from(value: RecordType) -> Self
	{
		match value
		{
			RecordType::Data => 0x00,
			RecordType::EndOfFile => 0x01,
			RecordType::ExtendedLinearAddress => 0x04,
			RecordType::Other(other) => other,
		}
	}
}

impl fmt::Display for RecordType
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		match self
		{
			Self::Data => f.write_str("data"),
			Self::EndOfFile => f.write_str("end of file"),
			Self::ExtendedLinearAddress => f.write_str("extended linear address"),
			Self::Other(other) => write!(f, "type {other:02X}"),
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record
{
	pub offset: u16,
	pub kind: RecordType,
	pub data: Vec<u8>,
	pub checksum: u8,
}

impl Record
{
	pub fn decode(line: &str) -> Result<Self, FormatError>
	{
		let raw = line.as_bytes();
		if raw.first() != Some(&START_CODE)
		{
			return Err(FormatError::StartCode);
		}
		if raw.len() < HEADER_LEN + CHECKSUM_LEN
		{
			return Err(FormatError::Length{expect: HEADER_LEN + CHECKSUM_LEN, have: raw.len()});
		}
		let count = parse_byte(raw, 1)?;
		let expect = HEADER_LEN + 2 * count as usize + CHECKSUM_LEN;
		if raw.len() != expect
		{
			return Err(FormatError::Length{expect, have: raw.len()});
		}
		let offset = u16::from_be_bytes([parse_byte(raw, 3)?, parse_byte(raw, 5)?]);
		let kind = RecordType::from(parse_byte(raw, 7)?);
		let data = (0..count as usize).map(|i| parse_byte(raw, DATA_START + 2 * i)).collect::<Result<Vec<_>, _>>()?;
		let checksum = parse_byte(raw, expect - CHECKSUM_LEN)?;
		if kind == RecordType::ExtendedLinearAddress && count != 2
		{
			return Err(FormatError::ExtendedAddress(count));
		}
		Ok(Self{offset, kind, data, checksum})
	}

	/// The upper address half carried by an extended linear address record.
	pub fn upper_address(&self) -> Option<u16>
	{
		match (self.kind, self.data.as_slice())
		{
			(RecordType::ExtendedLinearAddress, &[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
			_ => None,
		}
	}

	fn sum(&self) -> u8
	{
		let [hi, lo] = self.offset.to_be_bytes();
		self.data.iter().fold((self.data.len() as u8).wrapping_add(hi).wrapping_add(lo).wrapping_add(u8::from(self.kind)), |acc, &b| acc.wrapping_add(b))
	}

	pub fn expected_checksum(&self) -> u8
	{
		self.sum().wrapping_neg()
	}

	pub fn checksum_valid(&self) -> bool
	{
		self.checksum == self.expected_checksum()
	}

	/// Encodes the record with a freshly computed checksum.
	pub fn encode(&self) -> String
	{
		let mut out = format!(":{:02X}{:04X}{:02X}", self.data.len(), self.offset, u8::from(self.kind));
		self.data.iter().for_each(|b| out.push_str(&format!("{b:02X}")));
		out.push_str(&format!("{:02X}", self.expected_checksum()));
		out
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum FormatError
{
	#[error("missing start code ':'")]
	StartCode,
	#[error("invalid record length (expected {expect} characters, got {have})")]
	Length{expect: usize, have: usize},
	#[error("invalid hex digit at column {0}")]
	Digit(usize),
	#[error("odd number of hex digits ({0})")]
	OddDigits(usize),
	#[error("extended linear address record carries {0} bytes instead of 2")]
	ExtendedAddress(u8),
}

fn digit(raw: &[u8], pos: usize) -> Result<u8, FormatError>
{
	match raw.get(pos).copied()
	{
		Some(c @ b'0'..=b'9') => Ok(c - b'0'),
		Some(c @ b'A'..=b'F') => Ok(c - b'A' + 10),
		Some(c @ b'a'..=b'f') => Ok(c - b'a' + 10),
		_ => Err(FormatError::Digit(pos)),
	}
}

fn parse_byte(raw: &[u8], pos: usize) -> Result<u8, FormatError>
{
	Ok(digit(raw, pos)? << 4 | digit(raw, pos + 1)?)
}

fn digit_sum(digits: &[u8]) -> Result<u8, FormatError>
{
	if digits.len() % 2 != 0
	{
		return Err(FormatError::OddDigits(digits.len()));
	}
	(0..digits.len()).step_by(2).try_fold(0u8, |acc, pos| Ok(acc.wrapping_add(parse_byte(digits, pos)?)))
}

/// Line checksum of a run of hex digit pairs (everything between `:` and the checksum).
pub fn checksum(digits: &str) -> Result<String, FormatError>
{
	Ok(format!("{:02X}", digit_sum(digits.as_bytes())?.wrapping_neg()))
}

pub fn format_data_line(offset: u16, digits: &str) -> Result<String, FormatError>
{
	let count = digits.len() / 2;
	let count = u8::try_from(count).map_err(|_| FormatError::Length{expect: 2 * u8::MAX as usize, have: digits.len()})?;
	let body = format!("{count:02X}{offset:04X}00{digits}");
	let sum = checksum(&body)?;
	Ok(format!(":{body}{sum}"))
}

/// Rewrites the two digits at `column` and the trailing checksum, leaving every other character as it was.
///
/// The new digits are lowercase if the record was written in lowercase. Whitespace after the record is kept.
pub fn patch_line(line: &str, column: usize, value: u8) -> Result<String, FormatError>
{
	let body = line.trim_end();
	let record = Record::decode(body)?;
	let data_end = DATA_START + 2 * record.data.len();
	if column < DATA_START || column + 2 > data_end || (column - DATA_START) % 2 != 0
	{
		return Err(FormatError::Digit(column));
	}
	let lower = body[1..].bytes().any(|c| c.is_ascii_lowercase());
	let digits = |v: u8| if lower {format!("{v:02x}")} else {format!("{v:02X}")};

	let checksum_at = body.len() - CHECKSUM_LEN;
	let mut out = String::with_capacity(line.len());
	out.push_str(&body[..column]);
	out.push_str(&digits(value));
	out.push_str(&body[column + 2..checksum_at]);
	let sum = digit_sum(&out.as_bytes()[1..])?;
	out.push_str(&digits(sum.wrapping_neg()));
	out.push_str(&line[body.len()..]);
	Ok(out)
}
