use core::fmt;
use std::ops::{Bound, RangeBounds};

/// Inclusive address range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryRange
{
	first: u32,
	last: u32,
}

impl MemoryRange
{
	pub const ALL: Self = MemoryRange{first: 0, last: u32::MAX};

	pub fn new(first: u32, last: u32) -> Self
	{
		if first > last {panic!("invalid range {first} -> {last}");}
		Self{first, last}
	}

	/// The range of `len` addresses starting at `first`, clamped to the address space.
	pub fn with_len(first: u32, len: u32) -> Self
	{
		debug_assert!(len > 0);
		Self{first, last: first.saturating_add(len - 1)}
	}

	pub fn get_first(&self) -> u32
	{
		self.first
	}

	pub fn get_last(&self) -> u32
	{
		self.last
	}

	pub fn contains(&self, addr: u32) -> bool
	{
		self.first <= addr && addr <= self.last
	}

	/// Number of addresses, which does not fit `u32` for `Self::ALL`.
	pub fn len(&self) -> u64
	{
		u64::from(self.last - self.first) + 1
	}

	pub fn iter(&self) -> std::ops::RangeInclusive<u32>
	{
		self.first..=self.last
	}
}

impl RangeBounds<u32> for MemoryRange
{
	fn start_bound(&self) -> Bound<&u32>
	{
		Bound::Included(&self.first)
	}

	fn end_bound(&self) -> Bound<&u32>
	{
		Bound::Included(&self.last)
	}
}

macro_rules!mem_fmt
{
	($name:ident) =>
	{
		impl fmt::$name for MemoryRange
		{
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
			{
				<u32 as fmt::$name>::fmt(&self.first, f)?;
				f.write_str(" -> ")?;
				<u32 as fmt::$name>::fmt(&self.last, f)
			}
		}
	};
}
mem_fmt!(Display);
mem_fmt!(UpperHex);
mem_fmt!(LowerHex);
