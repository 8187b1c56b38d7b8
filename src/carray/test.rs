use pretty_assertions::assert_eq;

use super::*;

fn config(page_size: u32) -> EmitConfig
{
	EmitConfig{page_size, max_address: u32::MAX, header: "boot.h".to_owned()}
}

#[test]
fn phantom_bytes_are_dropped()
{
	// page 2 (0x20..0x2F) with zero phantoms, 0x24..0x27 left blank
	let text = ":040020001122330076\n:08002800445566007788990039\n:00000001FF\n";
	let image = MemoryImage::parse(text, 16).unwrap();
	let out = emit(&image, &config(16)).unwrap();
	assert_eq!(out.pages, vec![CArrayPage
	{
		page: 2,
		address: 0x20,
		data: vec![0x11, 0x22, 0x33, 0xFF, 0xFF, 0xFF, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99],
	}]);
}

#[test]
fn blank_pages_are_skipped()
{
	let text = ":0400000001020300F6\n:0400200004050600CD\n:00000001FF\n";
	let image = MemoryImage::parse(text, 16).unwrap();
	let out = emit(&image, &config(16)).unwrap();
	assert_eq!(out.pages.iter().map(|p| p.page).collect::<Vec<_>>(), vec![0, 2]);
	assert_eq!(&out.pages[0].data[..3], &[0x01, 0x02, 0x03]);
	assert_eq!(&out.pages[0].data[3..], &[0xFF; 9]);
}

#[test]
fn ceiling_limits_last_page()
{
	let text = ":0400000001020300F6\n:0400200004050600CD\n:00000001FF\n";
	let image = MemoryImage::parse(text, 16).unwrap();
	let mut cfg = config(16);
	cfg.max_address = 0x1F;
	let out = emit(&image, &cfg).unwrap();
	assert_eq!(out.pages.len(), 1);
}

#[test]
fn phantom_mismatch()
{
	let text = ":0400000001020304F2\n:00000001FF\n";
	let image = MemoryImage::parse(text, 16).unwrap();
	assert_eq!(emit(&image, &config(16)), Err(EmitError::PhantomByte{addr: 3, value: 4}));
}

#[test]
fn invalid_page_size()
{
	let image = MemoryImage::parse(":00000001FF\n", 16).unwrap();
	assert_eq!(emit(&image, &config(0)), Err(EmitError::PageSize(0)));
	assert_eq!(emit(&image, &config(10)), Err(EmitError::PageSize(10)));
	assert_eq!(emit(&image, &config(16)).unwrap().pages, vec![]);
}

#[test]
fn source_text()
{
	let out = CArray
	{
		header: "hex_to_c.h".to_owned(),
		pages: vec![
			CArrayPage{page: 3, address: 0x30, data: vec![0x01, 0xAB]},
			CArrayPage{page: 5, address: 0x50, data: vec![0xFF]},
		],
	};
	let expect = "\
#include \"hex_to_c.h\"

const uint8_t fData0[] =
{
    0x01,
    0xAB
};

const uint8_t fData1[] =
{
    0xFF
};

const hexToC_t hexToC[] =
{
    {
        3,
        fData0
    },
    {
        5,
        fData1
    }
};

uint16_t hexToCLength = sizeof(hexToC)/sizeof(hexToC_t);
";
	assert_eq!(out.to_string(), expect);
}
