//! Firmware descriptor patching.
//!
//! The firmware carries a descriptor at a fixed address that records the
//! range of flash pages it occupies and a CRC32 over those pages. Both are
//! inferred from the image and written back into the descriptor.

use core::fmt;

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::crc::Crc32;
use crate::image::{AddressError, MemoryImage, MemoryRange};


/// Value of an unprogrammed flash byte.
pub const BLANK: u8 = 0xFF;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder
{
	/// Most significant byte at the lowest address.
	#[default]
	Big,
	Little,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorField
{
	Crc32,
	StartPage,
	EndPage,
}

impl fmt::Display for DescriptorField
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		match self
		{
			Self::Crc32 => f.write_str("CRC32"),
			Self::StartPage => f.write_str("start page"),
			Self::EndPage => f.write_str("end page"),
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DescriptorLayout
{
	pub base: u32,
	pub crc_offset: u32,
	pub start_page_offset: u32,
	pub end_page_offset: u32,
	pub crc_order: ByteOrder,
}

impl DescriptorLayout
{
	pub const CRC_LEN: u32 = 4;
	pub const PAGE_LEN: u32 = 2;

	pub fn new(base: u32) -> Self
	{
		Self{base, crc_offset: 0x1E, start_page_offset: 0x14, end_page_offset: 0x12, crc_order: ByteOrder::Big}
	}

	pub fn address(&self, field: DescriptorField) -> u32
	{
		let offset = match field
		{
			DescriptorField::Crc32 => self.crc_offset,
			DescriptorField::StartPage => self.start_page_offset,
			DescriptorField::EndPage => self.end_page_offset,
		};
		self.base.wrapping_add(offset)
	}

	pub fn range(&self, field: DescriptorField) -> MemoryRange
	{
		let len = match field
		{
			DescriptorField::Crc32 => Self::CRC_LEN,
			DescriptorField::StartPage | DescriptorField::EndPage => Self::PAGE_LEN,
		};
		MemoryRange::with_len(self.address(field), len)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PatchConfig
{
	pub layout: DescriptorLayout,
	/// Flash page size, a power of two.
	pub page_size: u32,
	/// Address of page 0.
	pub flash_base: u32,
	/// Nothing below this address belongs to the firmware.
	pub app_min_address: u32,
	pub polynomial: u32,
}

impl Default for PatchConfig
{
	fn default() -> Self
	{
		Self
		{
			layout: DescriptorLayout::new(0x1D01FFDC),
			page_size: 0x400,
			flash_base: 0x1D000000,
			app_min_address: 0x1D006000,
			polynomial: Crc32::POLYNOMIAL,
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PatchReport
{
	pub start_page: u16,
	pub end_page: u16,
	/// Page-aligned range the CRC was computed over (without the descriptor page fold).
	pub range: MemoryRange,
	pub first_data: u32,
	pub last_data: u32,
	/// Whether the descriptor page had to be hashed on its own.
	pub descriptor_page: bool,
	pub crc: u32,
	pub hashed: usize,
}

#[derive(Clone, Debug)]
pub struct Patcher
{
	config: PatchConfig,
}

impl Patcher
{
	pub fn new(config: PatchConfig) -> Result<Self, PatchError>
	{
		if !config.page_size.is_power_of_two()
		{
			return Err(PatchError::PageSize(config.page_size));
		}
		if config.flash_base % config.page_size != 0
		{
			return Err(PatchError::FlashBase{flash_base: config.flash_base, page_size: config.page_size});
		}
		if config.app_min_address < config.flash_base || config.app_min_address >= config.layout.base
		{
			return Err(PatchError::AppRange{app_min: config.app_min_address, descriptor: config.layout.base});
		}
		Ok(Self{config})
	}

	pub fn config(&self) -> &PatchConfig
	{
		&self.config
	}

	/// Page index of `addr`, counted from the flash base.
	pub fn page_of(&self, addr: u32) -> Result<u32, PatchError>
	{
		match addr.checked_sub(self.config.flash_base)
		{
			Some(off) => Ok(off / self.config.page_size),
			None => Err(PatchError::BelowFlash(addr)),
		}
	}

	pub fn page_start(&self, page: u32) -> u32
	{
		self.config.flash_base.wrapping_add(page.wrapping_mul(self.config.page_size))
	}

	fn page_field(&self, page: u32) -> Result<u16, PatchError>
	{
		u16::try_from(page).map_err(|_| PatchError::PageOverflow(page))
	}

	/// Feeds `range` into `crc`, skipping the CRC field and hashing unprogrammed bytes as `BLANK`.
	pub fn hash_range(&self, image: &MemoryImage, range: MemoryRange, crc: &mut Crc32)
	{
		let skip = self.config.layout.range(DescriptorField::Crc32);
		for addr in range.iter().filter(|&a| !skip.contains(a))
		{
			let value = match image.get_byte(addr)
			{
				Ok(value) => value,
				Err(AddressError::NotFound(..)) => BLANK,
			};
			crc.update(value);
		}
	}

	pub fn patch(&self, image: &mut MemoryImage) -> Result<PatchReport, PatchError>
	{
		let layout = self.config.layout;
		let page_size = self.config.page_size;
		// verify every field up front so a failed patch leaves the image untouched
		for field in [DescriptorField::Crc32, DescriptorField::StartPage, DescriptorField::EndPage]
		{
			let range = layout.range(field);
			if let Some(addr) = range.iter().find(|&a| !image.contains(a))
			{
				return Err(PatchError::DescriptorNotFound{field, addr});
			}
			debug!("descriptor {field} field at 0x{:08X}", range.get_first());
		}
		info!("found firmware descriptor at 0x{:08X}", layout.base);

		let max_scan = image.max_address() | (page_size - 1);
		let min_scan = image.min_address().max(self.config.app_min_address);
		let top = max_scan.min(layout.base - 1);
		let first_data = if min_scan <= top {image.addresses(min_scan..=top).next()} else {None};
		let Some(first_data) = first_data
		else
		{
			return Err(PatchError::FirmwareNotFound{from: self.config.app_min_address, to: layout.base});
		};
		let start_page = self.page_of(first_data)?;
		let start_addr = self.page_start(start_page);
		info!("firmware starts on page {start_page} at 0x{first_data:08X}, hashing from 0x{start_addr:08X}");

		let last_data = image.addresses(start_addr..layout.base).next_back().unwrap_or(first_data);
		let end_page = self.page_of(last_data)?;
		let end_addr = self.page_start(end_page) + (page_size - 1);
		info!("firmware ends on page {end_page} at 0x{last_data:08X}, hashing up to 0x{end_addr:08X}");

		let start_field = self.page_field(start_page)?;
		let end_field = self.page_field(end_page)?;
		if !image.set16(layout.address(DescriptorField::EndPage), end_field)
		{
			return Err(PatchError::DescriptorNotFound{field: DescriptorField::EndPage, addr: layout.address(DescriptorField::EndPage)});
		}
		if !image.set16(layout.address(DescriptorField::StartPage), start_field)
		{
			return Err(PatchError::DescriptorNotFound{field: DescriptorField::StartPage, addr: layout.address(DescriptorField::StartPage)});
		}

		let mut crc = Crc32::new(self.config.polynomial);
		let range = MemoryRange::new(start_addr, end_addr);
		self.hash_range(image, range, &mut crc);
		let descriptor_page = end_addr < layout.base;
		if descriptor_page
		{
			let page = MemoryRange::with_len(self.page_start(self.page_of(layout.base)?), page_size);
			info!("firmware does not reach the descriptor, hashing its page {page:X} as well");
			self.hash_range(image, page, &mut crc);
		}
		let digest = crc.get_value();
		info!("CRC32 0x{digest:08X} over {} bytes", crc.count());

		let crc_addr = layout.address(DescriptorField::Crc32);
		let written = match layout.crc_order
		{
			ByteOrder::Big => image.set32(crc_addr, digest),
			ByteOrder::Little => digest.to_le_bytes().iter().zip(0..).all(|(&b, i)| image.set_byte(crc_addr + i, b)),
		};
		if !written
		{
			return Err(PatchError::DescriptorNotFound{field: DescriptorField::Crc32, addr: crc_addr});
		}

		Ok(PatchReport
		{
			start_page: start_field,
			end_page: end_field,
			range,
			first_data,
			last_data,
			descriptor_page,
			crc: digest,
			hashed: crc.count(),
		})
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PatchError
{
	#[error("firmware descriptor {field} field not found (address 0x{addr:08X} is not programmed)")]
	DescriptorNotFound{field: DescriptorField, addr: u32},
	#[error("no firmware data between 0x{from:08X} and descriptor at 0x{to:08X}")]
	FirmwareNotFound{from: u32, to: u32},
	#[error("page size {0} is not a power of two")]
	PageSize(u32),
	#[error("flash base 0x{flash_base:08X} is not aligned to page size {page_size}")]
	FlashBase{flash_base: u32, page_size: u32},
	#[error("application start 0x{app_min:08X} must lie between flash base and descriptor at 0x{descriptor:08X}")]
	AppRange{app_min: u32, descriptor: u32},
	#[error("address 0x{0:08X} lies below the flash base")]
	BelowFlash(u32),
	#[error("page {0} does not fit the 16-bit descriptor field")]
	PageOverflow(u32),
}
