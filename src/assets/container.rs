use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};

/// An open asset: a file plus the byte range inside it that holds the asset's
/// data, like a descriptor into a packaged archive.
pub struct AssetHandle {
    name: String,
    file: File,
    offset: u64,
    length: u64,
}

impl AssetHandle {
    pub fn new(name: impl Into<String>, file: File, offset: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            file,
            offset,
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start of the asset's data within `file()`.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Read exactly `n` bytes ending at the asset's last byte.
    pub fn read_tail(&mut self, n: u64) -> BridgeResult<Vec<u8>> {
        if self.length < n {
            return Err(BridgeError::Io(format!(
                "asset {} is {} bytes, shorter than the {} byte tail",
                self.name, self.length, n
            )));
        }

        let start = self.offset + self.length - n;
        self.file
            .seek(SeekFrom::Start(start))
            .map_err(|e| BridgeError::io(&self.name, e))?;

        let mut tail = vec![0u8; n as usize];
        self.file
            .read_exact(&mut tail)
            .map_err(|e| BridgeError::io(&self.name, e))?;
        Ok(tail)
    }
}

impl fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

/// Something assets can be opened from.
pub trait AssetContainer: Send + Sync {
    fn open(&self, name: &str) -> BridgeResult<AssetHandle>;
}

/// Plain files, optionally relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileSystemAssets {
    base: Option<PathBuf>,
}

impl FileSystemAssets {
    pub fn new() -> Self {
        Self { base: None }
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(name),
            None => Path::new(name).to_path_buf(),
        }
    }
}

impl AssetContainer for FileSystemAssets {
    fn open(&self, name: &str) -> BridgeResult<AssetHandle> {
        let path = self.resolve(name);
        let file = File::open(&path).map_err(|e| BridgeError::io(&path.display().to_string(), e))?;
        let length = file
            .metadata()
            .map_err(|e| BridgeError::io(&path.display().to_string(), e))?
            .len();
        Ok(AssetHandle::new(name, file, 0, length))
    }
}
