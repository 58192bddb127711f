// Packaged asset archive: serves uncompressed zip entries as byte ranges of the archive file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::container::{AssetContainer, AssetHandle};
use crate::config::ARCHIVE_ASSET_PREFIX;
use crate::error::{BridgeError, BridgeResult};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;
const EOCD_LEN: usize = 22;
const CENTRAL_LEN: usize = 46;
const LOCAL_LEN: usize = 30;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;
const METHOD_STORED: u16 = 0;

#[derive(Debug, Clone, Copy)]
struct ArchiveEntry {
    method: u16,
    compressed_size: u64,
    size: u64,
    local_header_offset: u64,
}

/// A zip archive whose stored entries can be handed out without extraction.
pub struct StoredArchive {
    path: PathBuf,
    entries: HashMap<String, ArchiveEntry>,
}

impl StoredArchive {
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let context = path.display().to_string();
        let mut file = File::open(&path).map_err(|e| BridgeError::io(&context, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| BridgeError::io(&context, e))?
            .len();

        // The end-of-central-directory record sits in the last 22 bytes plus
        // an optional comment.
        let window = (file_len as usize).min(EOCD_LEN + MAX_COMMENT_LEN);
        let window_start = file_len - window as u64;
        let tail = read_at(&mut file, window_start, window).map_err(|e| BridgeError::io(&context, e))?;
        let eocd_pos = find_eocd(&tail)
            .ok_or_else(|| BridgeError::Io(format!("{} is not a zip archive", context)))?;
        let eocd = &tail[eocd_pos..];

        let entry_count = le_u16(eocd, 10) as usize;
        let cd_size = le_u32(eocd, 12) as usize;
        let cd_offset = le_u32(eocd, 16) as u64;
        if cd_offset == u32::MAX as u64 || cd_offset + cd_size as u64 > file_len {
            return Err(BridgeError::Io(format!(
                "{} has an unsupported central directory",
                context
            )));
        }

        let cd = read_at(&mut file, cd_offset, cd_size).map_err(|e| BridgeError::io(&context, e))?;
        let entries = parse_central_directory(&cd, entry_count)
            .ok_or_else(|| BridgeError::Io(format!("{} has a corrupt central directory", context)))?;

        info!("opened asset archive {} ({} entries)", context, entries.len());
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&entry_key(name))
    }
}

impl AssetContainer for StoredArchive {
    fn open(&self, name: &str) -> BridgeResult<AssetHandle> {
        let key = entry_key(name);
        let entry = self
            .entries
            .get(&key)
            .ok_or_else(|| BridgeError::NotFound(format!("{} not in {}", key, self.path.display())))?;
        if entry.method != METHOD_STORED || entry.compressed_size != entry.size {
            return Err(BridgeError::NotFound(format!(
                "{} is compressed (method {}), no descriptor available",
                key, entry.method
            )));
        }

        let context = self.path.display().to_string();
        let mut file = File::open(&self.path).map_err(|e| BridgeError::io(&context, e))?;
        let header = read_at(&mut file, entry.local_header_offset, LOCAL_LEN)
            .map_err(|e| BridgeError::io(&context, e))?;
        if le_u32(&header, 0) != LOCAL_SIGNATURE {
            return Err(BridgeError::Io(format!("bad local header for {}", key)));
        }
        let name_len = le_u16(&header, 26) as u64;
        let extra_len = le_u16(&header, 28) as u64;
        let data_offset = entry.local_header_offset + LOCAL_LEN as u64 + name_len + extra_len;

        debug!("archive entry {} at offset={} len={}", key, data_offset, entry.size);
        Ok(AssetHandle::new(name, file, data_offset, entry.size))
    }
}

fn entry_key(name: &str) -> String {
    format!("{}{}", ARCHIVE_ASSET_PREFIX, name.trim_start_matches('/'))
}

fn read_at(file: &mut File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Scan backwards for the end-of-central-directory signature.
fn find_eocd(tail: &[u8]) -> Option<usize> {
    if tail.len() < EOCD_LEN {
        return None;
    }
    (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&pos| le_u32(tail, pos) == EOCD_SIGNATURE)
}

fn parse_central_directory(cd: &[u8], entry_count: usize) -> Option<HashMap<String, ArchiveEntry>> {
    let mut entries = HashMap::with_capacity(entry_count);
    let mut pos = 0usize;

    for _ in 0..entry_count {
        if pos + CENTRAL_LEN > cd.len() || le_u32(cd, pos) != CENTRAL_SIGNATURE {
            return None;
        }
        let method = le_u16(cd, pos + 10);
        let compressed_size = le_u32(cd, pos + 20) as u64;
        let size = le_u32(cd, pos + 24) as u64;
        let name_len = le_u16(cd, pos + 28) as usize;
        let extra_len = le_u16(cd, pos + 30) as usize;
        let comment_len = le_u16(cd, pos + 32) as usize;
        let local_header_offset = le_u32(cd, pos + 42) as u64;

        let name_start = pos + CENTRAL_LEN;
        let name_end = name_start + name_len;
        if name_end > cd.len() {
            return None;
        }
        let name = String::from_utf8_lossy(&cd[name_start..name_end]).into_owned();

        entries.insert(
            name,
            ArchiveEntry {
                method,
                compressed_size,
                size,
                local_header_offset,
            },
        );
        pos = name_end + extra_len + comment_len;
    }

    Some(entries)
}

fn le_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn le_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}
