pub mod carray;
pub mod config;
pub mod crc;
pub mod firmware;
pub mod hex;
pub mod image;
