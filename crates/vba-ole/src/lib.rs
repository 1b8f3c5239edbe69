//! A minimal reader for the Compound File Binary Format (a.k.a. OLE2),
//! the legacy structured-storage container used by binary Office documents
//! and, nested inside the ZIP-packaged formats, by the `vbaProject.bin`
//! macro payload.
//!
//! This is a trimmed, VBA-focused port: only the pieces needed to walk the
//! directory tree and read streams are kept. Cryptography (`EncryptionInfo`)
//! and the `\x05SummaryInformation` property-set readers that a general
//! purpose OLE library would carry have no counterpart here and are left
//! out on purpose.
#![warn(missing_docs)]

pub mod byteio;
mod error;

pub use error::{OleError, Result};

use byteio::{rdu16le, rdu32le, rdu64le, umin};
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{trace, warn};

const HEADER_SIG: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const FREESECT: u32 = 0xffff_ffff;
const ENDOFCHAIN: u32 = 0xffff_fffe;
const FATSECT: u32 = 0xffff_fffd;
const DIFSECT: u32 = 0xffff_fffc;
const NOSTREAM: u32 = 0xffff_ffff;
const MINI_STREAM_CUTOFF: u64 = 4096;
const DIR_ENTRY_SIZE: usize = 128;

/// A directory entry (storage or stream) inside an [`Ole`] container.
#[derive(Debug, Clone)]
pub struct OleEntry {
    id: u32,
    /// Entry name, as found in the directory (no path components).
    pub name: String,
    objtype: u8,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    /// Size, in bytes, of the entry's stream.
    pub size: u64,
}

impl OleEntry {
    /// True for storage (directory-like) entries.
    pub fn is_storage(&self) -> bool {
        self.objtype == 1 || self.objtype == 5
    }

    fn left(&self) -> Option<u32> {
        (self.left != NOSTREAM).then_some(self.left)
    }
    fn right(&self) -> Option<u32> {
        (self.right != NOSTREAM).then_some(self.right)
    }
    fn child(&self) -> Option<u32> {
        (self.child != NOSTREAM).then_some(self.child)
    }
}

struct Header {
    sector_shift: u16,
    mini_sector_shift: u16,
    num_fat_sectors: u32,
    first_dir_sector: u32,
    first_minifat_sector: u32,
    first_difat_sector: u32,
    num_difat_sectors: u32,
    inline_difat: [u32; 109],
}

fn parse_header<R: Read>(f: &mut R) -> Result<Header> {
    let mut sig = [0u8; 8];
    f.read_exact(&mut sig)?;
    if sig != HEADER_SIG {
        return Err(OleError::BadSignature);
    }
    let mut clsid = [0u8; 16];
    f.read_exact(&mut clsid)?;
    let _minor_version = rdu16le(f)?;
    let _major_version = rdu16le(f)?;
    let byte_order = rdu16le(f)?;
    if byte_order != 0xfffe {
        warn!("unexpected byte order marker {:#06x}", byte_order);
    }
    let sector_shift = rdu16le(f)?;
    let mini_sector_shift = rdu16le(f)?;
    let mut reserved = [0u8; 6];
    f.read_exact(&mut reserved)?;
    let _num_dir_sectors = rdu32le(f)?;
    let num_fat_sectors = rdu32le(f)?;
    let first_dir_sector = rdu32le(f)?;
    let _transaction_sig = rdu32le(f)?;
    let _mini_cutoff = rdu32le(f)?;
    let first_minifat_sector = rdu32le(f)?;
    let _num_minifat_sectors = rdu32le(f)?;
    let first_difat_sector = rdu32le(f)?;
    let num_difat_sectors = rdu32le(f)?;
    let mut inline_difat = [0u32; 109];
    for slot in inline_difat.iter_mut() {
        *slot = rdu32le(f)?;
    }
    Ok(Header {
        sector_shift,
        mini_sector_shift,
        num_fat_sectors,
        first_dir_sector,
        first_minifat_sector,
        first_difat_sector,
        num_difat_sectors,
        inline_difat,
    })
}

/// Reader and directory-tree walker for a Compound File Binary container.
pub struct Ole<R> {
    f: std::cell::RefCell<R>,
    sector_size: u64,
    mini_sector_size: u64,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    ministream: Vec<u8>,
    entries: Vec<OleEntry>,
    root_id: u32,
}

impl<R: Read + Seek> Ole<R> {
    /// Parses the container header, FAT, mini-FAT and directory.
    pub fn new(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = parse_header(&mut reader)?;
        let sector_size: u64 = 1u64 << header.sector_shift;
        let mini_sector_size: u64 = 1u64 << header.mini_sector_shift;

        let read_sector = |r: &mut R, idx: u32| -> Result<Vec<u8>> {
            let offset = (u64::from(idx) + 1) * sector_size;
            r.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; sector_size as usize];
            r.read_exact(&mut buf)?;
            Ok(buf)
        };

        // Collect FAT sector locations: 109 inlined in the header, plus
        // any DIFAT sectors that chain further ones.
        let mut fat_sector_locations: Vec<u32> = header
            .inline_difat
            .iter()
            .copied()
            .filter(|&s| s != FREESECT)
            .collect();
        let mut difat_sector = header.first_difat_sector;
        let entries_per_sector = (sector_size / 4) as usize;
        for _ in 0..header.num_difat_sectors {
            if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                break;
            }
            let buf = read_sector(&mut reader, difat_sector)?;
            let mut cursor = io::Cursor::new(&buf);
            for _ in 0..entries_per_sector.saturating_sub(1) {
                let v = rdu32le(&mut cursor)?;
                if v != FREESECT {
                    fat_sector_locations.push(v);
                }
            }
            difat_sector = rdu32le(&mut cursor)?;
        }

        let mut fat: Vec<u32> = Vec::with_capacity(fat_sector_locations.len() * entries_per_sector);
        for &loc in fat_sector_locations.iter().take(header.num_fat_sectors as usize) {
            let buf = read_sector(&mut reader, loc)?;
            let mut cursor = io::Cursor::new(&buf);
            for _ in 0..entries_per_sector {
                fat.push(rdu32le(&mut cursor)?);
            }
        }

        let read_chain = |r: &mut R, fat: &[u32], start: u32| -> Result<Vec<u8>> {
            let mut out = Vec::new();
            let mut sector = start;
            let mut seen = std::collections::HashSet::new();
            while sector != ENDOFCHAIN && sector != FREESECT {
                if !seen.insert(sector) {
                    return Err(OleError::Corrupt("cyclic sector chain".into()));
                }
                out.extend_from_slice(&read_sector(r, sector)?);
                sector = *fat.get(sector as usize).unwrap_or(&ENDOFCHAIN);
                if matches!(sector, FATSECT | DIFSECT) {
                    return Err(OleError::Corrupt("chain points at a FAT/DIFAT sector".into()));
                }
            }
            Ok(out)
        };

        let dir_bytes = read_chain(&mut reader, &fat, header.first_dir_sector)?;
        let mut entries = Vec::with_capacity(dir_bytes.len() / DIR_ENTRY_SIZE);
        for chunk in dir_bytes.chunks_exact(DIR_ENTRY_SIZE) {
            entries.push(parse_dir_entry(entries.len() as u32, chunk)?);
        }
        if entries.is_empty() {
            return Err(OleError::Corrupt("empty directory stream".into()));
        }
        let root_id = 0u32;

        let minifat_bytes = if header.first_minifat_sector == ENDOFCHAIN {
            Vec::new()
        } else {
            read_chain(&mut reader, &fat, header.first_minifat_sector)?
        };
        let mut minifat = Vec::with_capacity(minifat_bytes.len() / 4);
        for chunk in minifat_bytes.chunks_exact(4) {
            minifat.push(u32::from_le_bytes(chunk.try_into().unwrap()));
        }

        let root = &entries[root_id as usize];
        let ministream = if root.start_sector == ENDOFCHAIN || root.size == 0 {
            Vec::new()
        } else {
            let mut buf = read_chain(&mut reader, &fat, root.start_sector)?;
            buf.truncate(root.size as usize);
            buf
        };

        trace!(
            sectors = fat.len(),
            entries = entries.len(),
            "parsed compound file directory"
        );

        Ok(Self {
            f: std::cell::RefCell::new(reader),
            sector_size,
            mini_sector_size,
            fat,
            minifat,
            ministream,
            entries,
            root_id,
        })
    }

    /// Looks up an entry by a `/`-separated path, relative to the root
    /// storage (the root entry itself is implied and must be omitted).
    pub fn get_entry_by_name(&self, path: &str) -> Result<OleEntry> {
        let mut current = self.entries[self.root_id as usize].child();
        let mut found: Option<u32> = None;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Ok(self.entries[self.root_id as usize].clone());
        }
        for (i, component) in components.iter().enumerate() {
            let subtree_root = current.ok_or_else(|| OleError::NotFound(path.to_string()))?;
            let hit = self
                .find_in_subtree(subtree_root, component)
                .ok_or_else(|| OleError::NotFound(path.to_string()))?;
            if i + 1 == components.len() {
                found = Some(hit);
            } else {
                current = self.entries[hit as usize].child();
            }
        }
        found
            .map(|id| self.entries[id as usize].clone())
            .ok_or_else(|| OleError::NotFound(path.to_string()))
    }

    fn find_in_subtree(&self, start: u32, name: &str) -> Option<u32> {
        let mut stack = vec![start];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let entry = &self.entries[id as usize];
            if entry.name.eq_ignore_ascii_case(name) {
                return Some(id);
            }
            if let Some(l) = entry.left() {
                stack.push(l);
            }
            if let Some(r) = entry.right() {
                stack.push(r);
            }
        }
        None
    }

    /// Returns an iterator over the storages/streams directly inside `path`.
    pub fn list_children(&self, path: &str) -> Result<Vec<OleEntry>> {
        let storage = self.get_entry_by_name(path)?;
        let mut out = Vec::new();
        if let Some(child) = storage.child() {
            let mut stack = vec![child];
            let mut seen = std::collections::HashSet::new();
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                let entry = &self.entries[id as usize];
                if let Some(l) = entry.left() {
                    stack.push(l);
                }
                if let Some(r) = entry.right() {
                    stack.push(r);
                }
                out.push(entry.clone());
            }
        }
        Ok(out)
    }

    /// Returns a [`Read`]-able view of an entry's stream content.
    pub fn get_stream_reader(&self, entry: &OleEntry) -> Result<OleStreamReader<'_, R>> {
        if entry.size < MINI_STREAM_CUTOFF && entry.id != self.root_id {
            Ok(OleStreamReader::Mini {
                ole: self,
                sector: entry.start_sector,
                remaining: entry.size,
                offset_in_sector: 0,
            })
        } else {
            Ok(OleStreamReader::Regular {
                ole: self,
                sector: entry.start_sector,
                remaining: entry.size,
                offset_in_sector: 0,
            })
        }
    }

    fn read_regular_sector(&self, idx: u32) -> Result<Vec<u8>> {
        let offset = (u64::from(idx) + 1) * self.sector_size;
        let mut f = self.f.borrow_mut();
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.sector_size as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_mini_sector(&self, idx: u32) -> Result<Vec<u8>> {
        let start = idx as usize * self.mini_sector_size as usize;
        let end = start + self.mini_sector_size as usize;
        self.ministream
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or_else(|| OleError::Corrupt("mini-sector out of range".into()))
    }
}

/// A [`Read`] implementation over a single Ole entry's stream.
pub enum OleStreamReader<'a, R> {
    /// Stream content lives in regular (file-level) sectors.
    Regular {
        ole: &'a Ole<R>,
        sector: u32,
        remaining: u64,
        offset_in_sector: usize,
    },
    /// Stream content lives inside the mini-stream (small streams only).
    Mini {
        ole: &'a Ole<R>,
        sector: u32,
        remaining: u64,
        offset_in_sector: usize,
    },
}

impl<'a, R: Read + Seek> Read for OleStreamReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            OleStreamReader::Regular {
                ole,
                sector,
                remaining,
                offset_in_sector,
            } => {
                if *remaining == 0 || *sector == ENDOFCHAIN {
                    return Ok(0);
                }
                let data = ole
                    .read_regular_sector(*sector)
                    .map_err(io::Error::other)?;
                read_from_sector(
                    &data,
                    offset_in_sector,
                    remaining,
                    sector,
                    &ole.fat,
                    buf,
                )
            }
            OleStreamReader::Mini {
                ole,
                sector,
                remaining,
                offset_in_sector,
            } => {
                if *remaining == 0 || *sector == ENDOFCHAIN {
                    return Ok(0);
                }
                let data = ole.read_mini_sector(*sector).map_err(io::Error::other)?;
                read_from_sector(
                    &data,
                    offset_in_sector,
                    remaining,
                    sector,
                    &ole.minifat,
                    buf,
                )
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn read_from_sector(
    data: &[u8],
    offset_in_sector: &mut usize,
    remaining: &mut u64,
    sector: &mut u32,
    chain: &[u32],
    buf: &mut [u8],
) -> io::Result<usize> {
    let avail_in_sector = data.len() - *offset_in_sector;
    let want = umin(buf.len() as u64, umin(*remaining, avail_in_sector as u64)) as usize;
    buf[..want].copy_from_slice(&data[*offset_in_sector..*offset_in_sector + want]);
    *offset_in_sector += want;
    *remaining -= want as u64;
    if *offset_in_sector == data.len() {
        *offset_in_sector = 0;
        *sector = *chain.get(*sector as usize).unwrap_or(&ENDOFCHAIN);
    }
    Ok(want)
}

fn parse_dir_entry(id: u32, chunk: &[u8]) -> Result<OleEntry> {
    if chunk.len() != DIR_ENTRY_SIZE {
        return Err(OleError::Corrupt("truncated directory entry".into()));
    }
    let name_len = u16::from_le_bytes(chunk[64..66].try_into().unwrap()) as usize;
    let name = if name_len >= 2 {
        let units = (name_len - 2) / 2;
        let mut u16s = Vec::with_capacity(units);
        for i in 0..units {
            u16s.push(u16::from_le_bytes(chunk[2 * i..2 * i + 2].try_into().unwrap()));
        }
        String::from_utf16_lossy(&u16s)
    } else {
        String::new()
    };
    let objtype = chunk[66];
    let left = rdu32le(&mut &chunk[68..72])?;
    let right = rdu32le(&mut &chunk[72..76])?;
    let child = rdu32le(&mut &chunk[76..80])?;
    let start_sector = rdu32le(&mut &chunk[116..120])?;
    let size = rdu64le(&mut &chunk[120..128])?;
    Ok(OleEntry {
        id,
        name,
        objtype,
        left,
        right,
        child,
        start_sector,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    /// Builds a minimal, one-stream compound file by hand (512-byte sectors,
    /// one FAT sector, one directory sector, everything else empty) so the
    /// parser can be exercised without a real Office document.
    fn build_minimal_cfb(stream_name: &str, stream_data: &[u8]) -> Vec<u8> {
        const SECTOR: usize = 512;
        // Layout: sector 0 = FAT, sector 1 = directory, sector 2.. = stream data
        let data_sectors = stream_data.len().div_ceil(SECTOR).max(1);
        let mut fat = vec![FREESECT; SECTOR / 4];
        fat[0] = FATSECT; // FAT sector self-descriptor
        fat[1] = ENDOFCHAIN; // directory sector, single sector
        for s in 0..data_sectors {
            fat[2 + s] = if s + 1 == data_sectors {
                ENDOFCHAIN
            } else {
                (2 + s + 1) as u32
            };
        }

        let mut dir = vec![0u8; SECTOR];
        // Entry 0: Root Entry
        write_dir_entry(&mut dir[0..128], "Root Entry", 5, NOSTREAM, NOSTREAM, 1, ENDOFCHAIN, 0);
        // Entry 1: the stream
        write_dir_entry(
            &mut dir[128..256],
            stream_name,
            2,
            NOSTREAM,
            NOSTREAM,
            NOSTREAM,
            2,
            stream_data.len() as u64,
        );

        let mut out = vec![0u8; SECTOR]; // header
        out[0..8].copy_from_slice(&HEADER_SIG);
        out[24..26].copy_from_slice(&0x003eu16.to_le_bytes());
        out[26..28].copy_from_slice(&3u16.to_le_bytes());
        out[28..30].copy_from_slice(&0xfffeu16.to_le_bytes());
        out[30..32].copy_from_slice(&9u16.to_le_bytes()); // 512-byte sectors
        out[32..34].copy_from_slice(&6u16.to_le_bytes()); // 64-byte mini sectors
        out[40..44].copy_from_slice(&le32(0)); // num dir sectors (v3: 0)
        out[44..48].copy_from_slice(&le32(1)); // num fat sectors
        out[48..52].copy_from_slice(&le32(1)); // first dir sector
        out[56..60].copy_from_slice(&le32(0x1000));
        out[60..64].copy_from_slice(&le32(ENDOFCHAIN)); // no minifat
        out[68..72].copy_from_slice(&le32(ENDOFCHAIN)); // no extra difat
        out[76..80].copy_from_slice(&le32(0)); // DIFAT[0] = FAT sector 0

        out.extend_from_slice(&fat.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>());
        out.extend_from_slice(&dir);
        out.extend_from_slice(stream_data);
        while out.len() < SECTOR * (2 + data_sectors) {
            out.push(0);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn write_dir_entry(
        slot: &mut [u8],
        name: &str,
        objtype: u8,
        left: u32,
        right: u32,
        child: u32,
        start_sector: u32,
        size: u64,
    ) {
        let utf16: Vec<u16> = name.encode_utf16().collect();
        for (i, u) in utf16.iter().enumerate() {
            slot[2 * i..2 * i + 2].copy_from_slice(&u.to_le_bytes());
        }
        let name_len = (utf16.len() + 1) * 2;
        slot[64..66].copy_from_slice(&(name_len as u16).to_le_bytes());
        slot[66] = objtype;
        slot[67] = 1;
        slot[68..72].copy_from_slice(&left.to_le_bytes());
        slot[72..76].copy_from_slice(&right.to_le_bytes());
        slot[76..80].copy_from_slice(&child.to_le_bytes());
        slot[116..120].copy_from_slice(&start_sector.to_le_bytes());
        slot[120..128].copy_from_slice(&size.to_le_bytes());
    }

    #[test]
    fn reads_a_single_top_level_stream() {
        let payload = b"hello from a compound file stream, repeated padding..".repeat(20);
        let bytes = build_minimal_cfb("MyStream", &payload);
        let ole = Ole::new(Cursor::new(bytes)).unwrap();
        let entry = ole.get_entry_by_name("MyStream").unwrap();
        assert_eq!(entry.size, payload.len() as u64);
        let mut reader = ole.get_stream_reader(&entry).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let bytes = build_minimal_cfb("MyStream", b"x");
        let ole = Ole::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            ole.get_entry_by_name("DoesNotExist"),
            Err(OleError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_bad_signature() {
        let err = Ole::new(Cursor::new(vec![0u8; 512])).unwrap_err();
        assert!(matches!(err, OleError::BadSignature));
    }
}
