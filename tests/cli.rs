use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const FIRMWARE: &str = "\
:020000041D00DD
:10000000101112131415161718191A1B1C1D1E1F78
:10600000030A11181F262D343B424950575E656C18
:10641000010E1B2835424F5C697683909DAAB7C454
:020000041D01DC
:10FFDC0044455343000000000000000000000000F6
:10FFEC000100FFFFFFFF0000000000000000FFFF0A
:04FFFC00FFFF000003
:00000001FF
";

const SMALL: &str = ":02000004000AF0\n:04001000DEADBEEFB4\n:00000001FF\n";

fn fixture(dir: &TempDir, name: &str, text: &str) -> PathBuf
{
	let path = dir.path().join(name);
	fs::write(&path, text).unwrap();
	path
}

fn hexfw() -> Command
{
	Command::cargo_bin("hexfw").unwrap()
}

fn read(path: &Path) -> String
{
	fs::read_to_string(path).unwrap()
}

#[test]
fn crc_in_place()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "app.hex", FIRMWARE);
	hexfw().arg("crc").arg(&path).assert().success().stderr(predicate::str::contains("0x42D5649F"));
	let text = read(&path);
	assert!(text.contains(":10FFEC00010019001800000000000000000042D5BC\n"));
	assert!(text.contains(":04FFFC00649F0000FE\n"));
	assert_eq!(text.lines().count(), FIRMWARE.lines().count());
}

#[test]
fn crc_to_other_file()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "app.hex", FIRMWARE);
	let out = dir.path().join("patched.hex");
	hexfw().arg("crc").arg(&path).arg("-o").arg(&out).assert().success();
	assert_eq!(read(&path), FIRMWARE);
	assert!(read(&out).contains(":04FFFC00649F0000FE\n"));
}

#[test]
fn crc_flash_base_override()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "app.hex", FIRMWARE);
	hexfw().arg("crc").arg(&path).args(["--flash-base", "0x1D004000"]).assert().success();
	let text = read(&path);
	// pages 8 and 9 counted from the new base, same CRC
	assert!(text.contains(":10FFEC00010009000800000000000000000042D5DC\n"));
	assert!(text.contains(":04FFFC00649F0000FE\n"));
}

#[test]
fn crc_order_from_config()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "app.hex", FIRMWARE);
	let config = fixture(&dir, "hexfw.toml", "[firmware]\ncrc_order = \"little\"\n");
	hexfw().arg("-c").arg(&config).arg("crc").arg(&path).assert().success();
	let text = read(&path);
	assert!(text.contains(":10FFEC0001001900180000000000000000009F64D0\n"));
	assert!(text.contains(":04FFFC00D5420000EA\n"));
}

#[test]
fn crc_failure_leaves_file_alone()
{
	let dir = TempDir::new().unwrap();
	let text: String = FIRMWARE.lines().filter(|l| !l.starts_with(":04FFFC")).map(|l| format!("{l}\n")).collect();
	let path = fixture(&dir, "app.hex", &text);
	hexfw().arg("crc").arg(&path).assert().failure().stderr(predicate::str::contains("descriptor"));
	assert_eq!(read(&path), text);
}

#[test]
fn missing_input()
{
	let dir = TempDir::new().unwrap();
	hexfw().arg("crc").arg(dir.path().join("none.hex")).assert().failure().stderr(predicate::str::contains("could not read"));
}

#[test]
fn bad_config()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "app.hex", FIRMWARE);
	let config = fixture(&dir, "hexfw.toml", "[firmware]\npage = 1\n");
	hexfw().arg("-c").arg(&config).arg("crc").arg(&path).assert().failure();
	assert_eq!(read(&path), FIRMWARE);
}

#[test]
fn get_values()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "small.hex", SMALL);
	hexfw().args(["get"]).arg(&path).arg("0xA0010").assert().success().stdout("0xDE\n");
	hexfw().args(["get"]).arg(&path).args(["0xA0010", "-w", "16"]).assert().success().stdout("0xADDE\n");
	hexfw().args(["get"]).arg(&path).args(["0xA0010", "-w", "32"]).assert().success().stdout("0xEFBEADDE\n");
	hexfw().args(["get"]).arg(&path).arg("0xA0014").assert().failure();
}

#[test]
fn set_value()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "small.hex", SMALL);
	hexfw().arg("set").arg(&path).args(["0xA0011", "0"]).assert().success();
	assert_eq!(read(&path), ":02000004000AF0\n:04001000DE00BEEF61\n:00000001FF\n");
	hexfw().arg("set").arg(&path).args(["0xA0011", "0x100"]).assert().failure();
	hexfw().arg("set").arg(&path).args(["0xA0020", "1"]).assert().failure().stderr(predicate::str::contains("not programmed"));
	assert_eq!(read(&path), ":02000004000AF0\n:04001000DE00BEEF61\n:00000001FF\n");
}

#[test]
fn delete_line()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "small.hex", SMALL);
	hexfw().arg("delete-line").arg(&path).arg("4").assert().failure();
	hexfw().arg("delete-line").arg(&path).arg("2").assert().success();
	assert_eq!(read(&path), ":02000004000AF0\n:00000001FF\n");
}

#[test]
fn c_array()
{
	let dir = TempDir::new().unwrap();
	let path = fixture(&dir, "boot.hex", ":0400000001020300F6\n:00000001FF\n");
	let out = dir.path().join("boot.c");
	hexfw().arg("c-array").arg(&path).arg("-o").arg(&out).args(["--page-size", "16"]).assert().success();
	let source = read(&out);
	assert!(source.starts_with("#include \"hex_to_c.h\"\n"));
	assert!(source.contains("const uint8_t fData0[] =\n{\n    0x01,\n    0x02,\n    0x03,\n    0xFF,\n"));
	assert!(!source.contains("fData1"));
	assert!(source.ends_with("uint16_t hexToCLength = sizeof(hexToC)/sizeof(hexToC_t);\n"));
}
