/// CRC32 variant the firmware loader verifies against.
///
/// Unlike the usual reflected CRC32 the accumulator is inverted around every
/// single byte instead of once at the start and end of the message.
#[derive(Clone, Debug)]
pub struct Crc32
{
	polynomial: u32,
	value: u32,
	count: usize,
}

impl Crc32
{
	pub const POLYNOMIAL: u32 = 0xEB31D82E;

	pub fn new(polynomial: u32) -> Self
	{
		Self{polynomial, value: 0, count: 0}
	}

	pub fn update(&mut self, value: u8) -> u32
	{
		let mut acc = !self.value ^ u32::from(value);
		for _ in 0..8
		{
			acc = if acc & 1 != 0 {(acc >> 1) ^ self.polynomial} else {acc >> 1};
		}
		self.value = !acc;
		self.count += 1;
		self.value
	}

	pub fn update_slice(&mut self, value: &[u8]) -> u32
	{
		value.iter().for_each(|&v| {self.update(v);});
		self.value
	}

	pub fn get_value(&self) -> u32
	{
		self.value
	}

	/// Bytes fed since construction.
	pub fn count(&self) -> usize
	{
		self.count
	}
}

impl Default for Crc32
{
	fn default() -> Self
	{
		Self::new(Self::POLYNOMIAL)
	}
}

#[cfg(test)]
mod test
{
	use pretty_assertions::assert_eq;
	use test_case::test_case;

	use super::*;

	#[test_case(b"", 0x00000000 ; "empty")]
	#[test_case(b"\x00", 0x3F522C72 ; "zero byte")]
	#[test_case(b"\xFF", 0xFF000000 ; "blank byte")]
	#[test_case(b"\xFF\xFF\xFF\xFF", 0xFFFFFFFF ; "blank word")]
	#[test_case(b"123456789", 0x2D3DD0AE ; "check string")]
	fn known_values(input: &[u8], expect: u32)
	{
		let mut crc = Crc32::default();
		assert_eq!(crc.update_slice(input), expect);
		assert_eq!(crc.count(), input.len());
	}

	#[test]
	fn deterministic()
	{
		let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
		let mut a = Crc32::default();
		let mut b = Crc32::default();
		assert_eq!(a.update_slice(&data), b.update_slice(&data));
	}

	#[test]
	fn single_bit_flips()
	{
		let data: Vec<u8> = (0..64u8).map(|v| v.wrapping_mul(37)).collect();
		let reference = Crc32::default().update_slice(&data);
		for pos in 0..data.len()
		{
			for bit in 0..8
			{
				let mut flipped = data.clone();
				flipped[pos] ^= 1 << bit;
				assert_ne!(Crc32::default().update_slice(&flipped), reference, "flip of bit {bit} in byte {pos}");
			}
		}
	}

	#[test]
	fn polynomial_matters()
	{
		let mut custom = Crc32::new(0xEDB88320);
		let mut default = Crc32::default();
		assert_ne!(custom.update_slice(b"123456789"), default.update_slice(b"123456789"));
	}

	#[test]
	fn update_returns_accumulator()
	{
		let mut crc = Crc32::default();
		let first = crc.update(0x12);
		assert_eq!(first, crc.get_value());
		let second = crc.update(0x34);
		assert_ne!(first, second);
		assert_eq!(second, crc.get_value());
	}
}
