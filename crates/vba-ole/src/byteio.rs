//! Small little-endian primitive readers shared by the compound-file parser
//! and, downstream, by the VBA record decoders.
use std::io::{self, Read};

/// Single byte `u8` reader
#[inline]
pub fn rdu8<R: Read>(r: &mut R) -> Result<u8, io::Error> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Little endian `u16` reader
#[inline]
pub fn rdu16le<R: Read>(r: &mut R) -> Result<u16, io::Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Little endian `u32` reader
#[inline]
pub fn rdu32le<R: Read>(r: &mut R) -> Result<u32, io::Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Little endian `u64` reader
#[inline]
pub fn rdu64le<R: Read>(r: &mut R) -> Result<u64, io::Error> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// `min()` across two differently-typed unsigned integers, saturating
/// instead of failing to convert
#[inline]
pub fn umin(a: impl TryInto<u64>, b: impl TryInto<u64>) -> u64 {
    let a: u64 = a.try_into().unwrap_or(u64::MAX);
    let b: u64 = b.try_into().unwrap_or(u64::MAX);
    a.min(b)
}
