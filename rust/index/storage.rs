use anyhow::{anyhow, bail, Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Little-endian `f32` matrix storage, either read into memory or mapped.
pub enum F32Buffer {
    Owned(Vec<f32>),
    Mapped { mmap: Mmap, len: usize },
}

impl F32Buffer {
    /// Read the whole file into memory.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = read_bytes(path)?;
        if bytes.len() % 4 != 0 {
            bail!("{:?} is not a whole number of f32 values", path);
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(F32Buffer::Owned(values))
    }

    /// Memory-map the file. Requires a little-endian host.
    pub fn map(path: &Path) -> Result<Self> {
        if cfg!(target_endian = "big") {
            bail!("memory-mapped loading requires a little-endian host");
        }

        let file = File::open(path).map_err(|e| anyhow!("Failed to open file for mmap: {}", e))?;
        // SAFETY: index files are written once and never modified while a
        // searcher holds them open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| anyhow!("Failed to mmap file: {}", e))?;

        if mmap.len() % 4 != 0 {
            bail!("{:?} is not a whole number of f32 values", path);
        }
        if mmap.as_ptr().align_offset(std::mem::align_of::<f32>()) != 0 {
            bail!("mapping of {:?} is not aligned for f32 access", path);
        }

        let len = mmap.len() / 4;
        Ok(F32Buffer::Mapped { mmap, len })
    }

    pub fn load(path: &Path, with_mmap: bool) -> Result<Self> {
        if with_mmap {
            Self::map(path)
        } else {
            Self::read(path)
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            F32Buffer::Owned(values) => values,
            F32Buffer::Mapped { mmap, len } => {
                // SAFETY: `map` checked length and alignment, and every bit
                // pattern is a valid f32.
                unsafe { std::slice::from_raw_parts(mmap.as_ptr() as *const f32, *len) }
            },
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, F32Buffer::Mapped { .. })
    }
}

impl std::fmt::Debug for F32Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("F32Buffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok(bytes)
}

pub fn read_u32_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = read_bytes(path)?;
    if bytes.len() % 4 != 0 {
        bail!("{:?} is not a whole number of u32 values", path);
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

pub fn write_f32_file(path: &Path, values: impl IntoIterator<Item = f32>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_u32_file(path: &Path, values: &[u32]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_and_mapped_reads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.bin");
        write_f32_file(&path, [1.0, -2.5, 0.0, 3.25]).unwrap();

        let owned = F32Buffer::read(&path).unwrap();
        let mapped = F32Buffer::map(&path).unwrap();
        assert!(!owned.is_mapped());
        assert!(mapped.is_mapped());
        assert_eq!(owned.as_slice(), mapped.as_slice());
        assert_eq!(owned.as_slice(), &[1.0, -2.5, 0.0, 3.25]);
    }

    #[test]
    fn truncated_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        std::fs::write(&path, [0u8; 6]).unwrap();
        assert!(F32Buffer::read(&path).is_err());
        assert!(read_u32_file(&path).is_err());
    }

    #[test]
    fn u32_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ivf.bin");
        write_u32_file(&path, &[0, 7, u32::MAX]).unwrap();
        assert_eq!(read_u32_file(&path).unwrap(), vec![0, 7, u32::MAX]);
    }
}
