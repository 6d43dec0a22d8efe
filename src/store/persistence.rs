//! On-disk layout of a vector store directory.
//!
//! ```text
//! <dir>/vectors.idx   header + row-major little-endian f32 rows
//! <dir>/chunks.json   JSON array of chunk texts, ordinal order
//! <dir>/.lock         advisory lock file
//! ```
//!
//! Both data files are written to a sibling `.tmp` file and renamed into
//! place while an exclusive lock is held, so readers never observe a torn
//! write. Readers take a shared lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use super::flat_index::FlatL2Index;

const INDEX_FILE: &str = "vectors.idx";
const CHUNKS_FILE: &str = "chunks.json";
const LOCK_FILE: &str = ".lock";

const MAGIC: &[u8; 4] = b"DQVX";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt index file: {0}")]
    Corrupt(String),
    #[error("unreadable chunk list: {0}")]
    Chunks(#[from] serde_json::Error),
}

/// Contents of a store directory as last persisted.
#[derive(Debug)]
pub struct PersistedStore {
    pub model_id: String,
    pub index: FlatL2Index,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StoreFiles {
    dir: PathBuf,
}

impl StoreFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// True when either data file is present.
    pub fn exists(&self) -> bool {
        self.index_path().exists() || self.chunks_path().exists()
    }

    pub fn load(&self) -> Result<PersistedStore, LoadError> {
        // dropping the lock file releases the advisory lock
        let (index_bytes, chunk_bytes) = {
            let lock = self.open_lock()?;
            FileExt::lock_shared(&lock)?;
            (fs::read(self.index_path())?, fs::read(self.chunks_path())?)
        };

        let (model_id, index) = decode_index(&index_bytes)?;
        let chunks: Vec<String> = serde_json::from_slice(&chunk_bytes)?;
        Ok(PersistedStore {
            model_id,
            index,
            chunks,
        })
    }

    pub fn save(&self, model_id: &str, index: &FlatL2Index, chunks: &[String]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let chunk_bytes = serde_json::to_vec(chunks)?;
        let lock = self.open_lock()?;
        FileExt::lock_exclusive(&lock)?;

        write_atomic(&self.index_path(), &encode_index(model_id, index))?;
        write_atomic(&self.chunks_path(), &chunk_bytes)?;
        drop(lock);
        Ok(())
    }

    /// Delete the data files, the lock file and the directory itself.
    ///
    /// Unknown files are left alone; a directory that still holds them is
    /// kept. Missing files are not an error.
    pub fn remove(&self) -> io::Result<()> {
        for path in [self.index_path(), self.chunks_path(), self.lock_path()] {
            remove_if_present(&path)?;
        }
        match fs::remove_dir(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                tracing::warn!(
                    "Store directory {} not removed: {}",
                    self.dir.display(),
                    err
                );
                Ok(())
            }
        }
    }

    fn open_lock(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("store");
    let tmp = path.with_file_name(format!("{}.tmp", file_name));

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn encode_index(model_id: &str, index: &FlatL2Index) -> Vec<u8> {
    let values = index.to_flat();
    let mut bytes = Vec::with_capacity(24 + model_id.len() + values.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(model_id.len() as u32).to_le_bytes());
    bytes.extend_from_slice(model_id.as_bytes());
    bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    bytes
}

fn decode_index(bytes: &[u8]) -> Result<(String, FlatL2Index), LoadError> {
    let mut reader = ByteReader { bytes, pos: 0 };

    if reader.take(4)? != MAGIC {
        return Err(LoadError::Corrupt("bad magic".to_string()));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(LoadError::Corrupt(format!(
            "unsupported format version {}",
            version
        )));
    }
    let dimension = reader.u32()? as usize;
    let rows = reader.u64()? as usize;
    let id_len = reader.u32()? as usize;
    let model_id = String::from_utf8(reader.take(id_len)?.to_vec())
        .map_err(|_| LoadError::Corrupt("model id is not utf-8".to_string()))?;

    let body = reader.rest();
    let expected = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| LoadError::Corrupt("row count overflows".to_string()))?;
    if body.len() != expected {
        return Err(LoadError::Corrupt(format!(
            "expected {} bytes of vectors, found {}",
            expected,
            body.len()
        )));
    }

    let values: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let index = FlatL2Index::from_flat(dimension, values)
        .map_err(|err| LoadError::Corrupt(err.to_string()))?;
    Ok((model_id, index))
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| LoadError::Corrupt("unexpected end of file".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatL2Index {
        let mut index = FlatL2Index::new(3);
        index
            .add(&[vec![1.0, 0.0, 0.5], vec![-2.0, 0.25, 4.0]])
            .unwrap();
        index
    }

    #[test]
    fn save_then_load_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path().join("store"));
        let chunks = vec!["first".to_string(), "second".to_string()];

        files.save("test-model", &sample_index(), &chunks).unwrap();
        let loaded = files.load().unwrap();

        assert_eq!(loaded.model_id, "test-model");
        assert_eq!(loaded.chunks, chunks);
        assert_eq!(loaded.index.dimension(), 3);
        assert_eq!(loaded.index.to_flat(), sample_index().to_flat());
    }

    #[test]
    fn lock_is_released_after_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path().join("store"));

        files.save("m", &sample_index(), &["a".into(), "b".into()]).unwrap();
        files.load().unwrap();

        let other = files.open_lock().unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_ok());
    }

    #[test]
    fn no_temp_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path());
        files.save("m", &sample_index(), &["a".into(), "b".into()]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn truncated_index_is_corrupt() {
        let bytes = encode_index("m", &sample_index());
        let err = decode_index(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt(_)));

        let err = decode_index(b"nope").unwrap_err();
        assert!(matches!(err, LoadError::Corrupt(_)));
    }

    #[test]
    fn remove_is_idempotent_and_deletes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let files = StoreFiles::new(&store_dir);
        files.save("m", &sample_index(), &["a".into(), "b".into()]).unwrap();

        files.remove().unwrap();
        assert!(!store_dir.exists());
        files.remove().unwrap();
    }

    #[test]
    fn remove_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path());
        files.save("m", &sample_index(), &["a".into(), "b".into()]).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        files.remove().unwrap();
        assert!(dir.path().join("notes.txt").exists());
        assert!(!files.exists());
    }
}
