use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::carray::EmitConfig;
use crate::firmware::{ByteOrder, DescriptorLayout, PatchConfig};

/// Target constants, loaded from a TOML file. Every field has a default.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config
{
	pub firmware: FirmwareConfig,
	pub carray: CArrayConfig,
}

impl Config
{
	pub fn parse(text: &str) -> Result<Self, ConfigError>
	{
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError>
	{
		let text = fs::read_to_string(path).map_err(|source| ConfigError::Io{path: path.to_owned(), source})?;
		Self::parse(&text)
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirmwareConfig
{
	pub page_size: u32,
	pub flash_base: u32,
	pub app_min_address: u32,
	pub descriptor: u32,
	pub polynomial: u32,
	pub crc_order: ByteOrder,
}

impl Default for FirmwareConfig
{
	fn default() -> Self
	{
		let patch = PatchConfig::default();
		Self
		{
			page_size: patch.page_size,
			flash_base: patch.flash_base,
			app_min_address: patch.app_min_address,
			descriptor: patch.layout.base,
			polynomial: patch.polynomial,
			crc_order: patch.layout.crc_order,
		}
	}
}

impl FirmwareConfig
{
	pub fn patch_config(&self) -> PatchConfig
	{
		let mut layout = DescriptorLayout::new(self.descriptor);
		layout.crc_order = self.crc_order;
		PatchConfig
		{
			layout,
			page_size: self.page_size,
			flash_base: self.flash_base,
			app_min_address: self.app_min_address,
			polynomial: self.polynomial,
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CArrayConfig
{
	pub page_size: u32,
	pub max_address: u32,
	pub header: String,
	pub output: PathBuf,
}

impl Default for CArrayConfig
{
	fn default() -> Self
	{
		let emit = EmitConfig::default();
		Self{page_size: emit.page_size, max_address: emit.max_address, header: emit.header, output: PathBuf::from("hex_to_c.c")}
	}
}

impl CArrayConfig
{
	pub fn emit_config(&self) -> EmitConfig
	{
		EmitConfig{page_size: self.page_size, max_address: self.max_address, header: self.header.clone()}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError
{
	#[error("could not read {}", path.display())]
	Io
	{
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid configuration")]
	Toml(#[from] toml::de::Error),
}
