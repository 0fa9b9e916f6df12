//! Scratch key-value stores used by reducers to spill partial sums.
//!
//! A scratch store is disposable: it lives for one run of one partition and
//! durability is never required. Values always go through `entry::Count` so the
//! spill and output paths agree on the encoding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log;

use crate::entry::Count;
use crate::error::{IoContext, Result, WordCountError};

/// Raw key bytes paired with the decoded cumulative count.
pub type StoredEntry = (Vec<u8>, i64);

pub trait ScratchStore: Send {
    fn exists(&self, key: &str) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<i64>>;

    fn put(&mut self, key: &str, count: i64) -> Result<()>;

    fn clear_all(&mut self) -> Result<()>;

    /// Iterate every stored entry. Keys are handed out as raw bytes, the caller
    /// decides what to do with ones that are not valid text.
    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = Result<StoredEntry>> + 'a>;
}

/// Scratch store backed by a sled database on local disk.
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

impl SledStore {
    /// Open (or create) the store of one partition under `scratch_dir`.
    pub fn for_partition<P: AsRef<Path>>(scratch_dir: P, partition: usize) -> Result<SledStore> {
        let path = scratch_dir.as_ref().join(partition.to_string());

        std::fs::create_dir_all(&path).at(&path)?;

        log::debug!("Open scratch store at {}", path.display());

        let db = sled::Config::new()
            .path(&path)
            .open()
            .map_err(|cause| WordCountError::store("open", "", cause))?;

        Ok(SledStore { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScratchStore for SledStore {
    fn exists(&self, key: &str) -> Result<bool> {
        self.db
            .contains_key(key)
            .map_err(|cause| WordCountError::store("exists", key, cause))
    }

    fn get(&self, key: &str) -> Result<Option<i64>> {
        let raw = self
            .db
            .get(key)
            .map_err(|cause| WordCountError::store("get", key, cause))?;

        match raw {
            Some(value) => decode(key.as_bytes(), &value).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &str, count: i64) -> Result<()> {
        let value = Count::encode(count);

        self.db
            .insert(key, &value[..])
            .map(|_| ())
            .map_err(|cause| WordCountError::store("put", key, cause))
    }

    fn clear_all(&mut self) -> Result<()> {
        self.db
            .clear()
            .map_err(|cause| WordCountError::store("clear", "", cause))
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = Result<StoredEntry>> + 'a> {
        Box::new(self.db.iter().map(|item| {
            let (key, value) =
                item.map_err(|cause| WordCountError::store("iterate", "", cause))?;
            let count = decode(&key, &value)?;
            Ok((key.to_vec(), count))
        }))
    }
}

/// In-memory scratch store, ordered by key bytes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a pre-encoded value under arbitrary key bytes.
    pub fn put_raw(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }
}

impl ScratchStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key.as_bytes()))
    }

    fn get(&self, key: &str) -> Result<Option<i64>> {
        match self.entries.get(key.as_bytes()) {
            Some(value) => decode(key.as_bytes(), value).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &str, count: i64) -> Result<()> {
        self.entries
            .insert(key.as_bytes().to_vec(), Count::encode(count).to_vec());
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = Result<StoredEntry>> + 'a> {
        Box::new(
            self.entries
                .iter()
                .map(|(key, value)| decode(key, value).map(|count| (key.clone(), count))),
        )
    }
}

/// Store whose writes always fail, standing in for a full or broken disk.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

#[cfg(test)]
impl ScratchStore for FailingStore {
    fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn get(&self, _key: &str) -> Result<Option<i64>> {
        Ok(None)
    }

    fn put(&mut self, key: &str, _count: i64) -> Result<()> {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "no space left on device");
        Err(WordCountError::store("put", key, sled::Error::Io(cause)))
    }

    fn clear_all(&mut self) -> Result<()> {
        Ok(())
    }

    fn entries<'a>(&'a self) -> Box<dyn Iterator<Item = Result<StoredEntry>> + 'a> {
        Box::new(std::iter::empty())
    }
}

fn decode(key: &[u8], value: &[u8]) -> Result<i64> {
    Count::decode(value).ok_or_else(|| WordCountError::CorruptValue {
        key: String::from_utf8_lossy(key).into_owned(),
        len: value.len(),
    })
}
