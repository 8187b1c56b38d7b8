//! C source generation for embedding an image into another firmware.
//!
//! Flash words on the target are 24 bits wide but stored as 32 bits in the
//! HEX file, so every fourth byte is a phantom that must be zero (or blank)
//! and is left out of the arrays.

use core::fmt;

use log::{debug, info};
use thiserror::Error;

use crate::firmware::BLANK;
use crate::image::{AddressError, MemoryImage, MemoryRange};

#[cfg(test)]
mod test;

pub const WORD_LEN: u32 = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmitConfig
{
	pub page_size: u32,
	/// Addresses above this are not considered when picking the last page.
	pub max_address: u32,
	/// Header included by the generated source.
	pub header: String,
}

impl Default for EmitConfig
{
	fn default() -> Self
	{
		Self{page_size: 2048, max_address: 0x1FC00BF0, header: "hex_to_c.h".to_owned()}
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CArrayPage
{
	pub page: u32,
	pub address: u32,
	pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CArray
{
	pub header: String,
	pub pages: Vec<CArrayPage>,
}

impl fmt::Display for CArray
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		write!(f, "#include \"{}\"\n\n", self.header)?;
		for (i, page) in self.pages.iter().enumerate()
		{
			write!(f, "const uint8_t fData{i}[] =\n{{\n")?;
			for (j, b) in page.data.iter().enumerate()
			{
				if j > 0 {f.write_str(",\n")?;}
				write!(f, "    0x{b:02X}")?;
			}
			f.write_str("\n};\n\n")?;
		}
		f.write_str("const hexToC_t hexToC[] =\n{\n")?;
		for (i, page) in self.pages.iter().enumerate()
		{
			if i > 0 {f.write_str(",\n")?;}
			write!(f, "    {{\n        {},\n        fData{i}\n    }}", page.page)?;
		}
		f.write_str("\n};\n\n")?;
		f.write_str("uint16_t hexToCLength = sizeof(hexToC)/sizeof(hexToC_t);\n")
	}
}

pub fn emit(image: &MemoryImage, config: &EmitConfig) -> Result<CArray, EmitError>
{
	if config.page_size == 0 || config.page_size % WORD_LEN != 0
	{
		return Err(EmitError::PageSize(config.page_size));
	}
	let mut pages = Vec::new();
	let last = image.max_address().min(config.max_address);
	if last < image.max_address()
	{
		info!("ignoring data above 0x{last:08X}");
	}
	let mut page_addr = (image.min_address() / config.page_size) * config.page_size;
	while page_addr <= last
	{
		let range = MemoryRange::with_len(page_addr, config.page_size);
		if image.addresses(range).next().is_some()
		{
			info!("writing page {} at 0x{page_addr:08X}", page_addr / config.page_size);
			pages.push(CArrayPage{page: page_addr / config.page_size, address: page_addr, data: page_data(image, range)?});
		}
		else {debug!("page {} is blank", page_addr / config.page_size);}
		match page_addr.checked_add(config.page_size)
		{
			Some(next) => page_addr = next,
			None => break,
		}
	}
	Ok(CArray{header: config.header.clone(), pages})
}

fn page_data(image: &MemoryImage, range: MemoryRange) -> Result<Vec<u8>, EmitError>
{
	let mut data = Vec::with_capacity((range.len() - range.len() / u64::from(WORD_LEN)) as usize);
	for (i, addr) in range.iter().enumerate()
	{
		let value = match image.get_byte(addr)
		{
			Ok(value) => Some(value),
			Err(AddressError::NotFound(..)) => None,
		};
		if i as u32 % WORD_LEN == WORD_LEN - 1
		{
			match value
			{
				None | Some(0) => (),
				Some(value) => return Err(EmitError::PhantomByte{addr, value}),
			}
		}
		else {data.push(value.unwrap_or(BLANK));}
	}
	Ok(data)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum EmitError
{
	#[error("page size {0} is not a multiple of the flash word")]
	PageSize(u32),
	#[error("phantom byte at 0x{addr:08X} holds 0x{value:02X}, image is misaligned")]
	PhantomByte{addr: u32, value: u8},
}
