//! On-disk persistence for [`FlatIndex`].
//!
//! An index location is a directory holding two redb files:
//!
//! - `vectors.redb`: table `vectors` (position -> native-endian f32
//!   bytes) and table `meta` (`format`, `model_id`, `dimension`, `count`,
//!   `fingerprint`).
//! - `chunks.redb`: table `chunks` (position -> chunk JSON) and table
//!   `meta` (`count`, `fingerprint`).
//!
//! Both files carry the same blake3 fingerprint of the whole build, so a
//! vectors file from one build is never paired with the chunks of another.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex, PoisonError, RwLock},
};

use redb::{
    Database,
    ReadOnlyDatabase,
    ReadOnlyTable,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use tracing::{debug, info};

use crate::{
    chunking::Chunk,
    error::{Error, Result},
    vector_index::{FlatIndex, SimilarityIndex},
};

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const CHUNKS: TableDefinition<u64, &str> = TableDefinition::new("chunks");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

type MetaTable = ReadOnlyTable<&'static str, &'static str>;

pub const VECTORS_FILE: &str = "vectors.redb";
pub const CHUNKS_FILE: &str = "chunks.redb";
const TMP_SUFFIX: &str = "tmp";

const FORMAT_VERSION: &str = "1";

const META_FORMAT: &str = "format";
const META_MODEL_ID: &str = "model_id";
const META_DIMENSION: &str = "dimension";
const META_COUNT: &str = "count";
const META_FINGERPRINT: &str = "fingerprint";

/// One reader/writer lock per index location, shared process-wide.
static LOCATION_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>> =
    LazyLock::new(Default::default);

fn location_lock(location: &Path) -> Arc<RwLock<()>> {
    let key = std::path::absolute(location)
        .unwrap_or_else(|_| location.to_path_buf());
    let mut locks =
        LOCATION_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_default().clone()
}

/// Reads and writes the persisted index at one location.
#[derive(Debug, Clone)]
pub struct IndexStore {
    location: PathBuf,
}

impl IndexStore {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    fn vectors_path(&self) -> PathBuf {
        self.location.join(VECTORS_FILE)
    }

    fn chunks_path(&self) -> PathBuf {
        self.location.join(CHUNKS_FILE)
    }

    /// Whether any index artifact is present.
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() || self.chunks_path().exists()
    }

    /// Replace whatever index lives at this location with `index`.
    ///
    /// Both files are written under temporary names and renamed into place
    /// once complete.
    pub fn persist(&self, index: &FlatIndex) -> Result<()> {
        let lock = location_lock(&self.location);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&self.location)?;
        let fingerprint = fingerprint(index)?;

        let vectors_tmp = self.vectors_path().with_extension(TMP_SUFFIX);
        let chunks_tmp = self.chunks_path().with_extension(TMP_SUFFIX);
        remove_if_exists(&vectors_tmp)?;
        remove_if_exists(&chunks_tmp)?;

        write_vectors(&vectors_tmp, index, &fingerprint)?;
        write_chunks(&chunks_tmp, index, &fingerprint)?;

        std::fs::rename(&vectors_tmp, self.vectors_path())?;
        std::fs::rename(&chunks_tmp, self.chunks_path())?;

        info!(
            location = %self.location.display(),
            chunks = index.len(),
            "persisted index"
        );
        Ok(())
    }

    /// Load the index at this location.
    ///
    /// Returns `Ok(None)` when neither artifact exists. Any inconsistency
    /// between or within the artifacts is reported as
    /// [`Error::CorruptIndex`].
    pub fn load(&self) -> Result<Option<FlatIndex>> {
        let lock = location_lock(&self.location);
        let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);

        let vectors_path = self.vectors_path();
        let chunks_path = self.chunks_path();
        match (vectors_path.exists(), chunks_path.exists()) {
            (false, false) => {
                info!(location = %self.location.display(), "no index found");
                return Ok(None);
            }
            (true, false) => {
                return Err(Error::corrupt(
                    &self.location,
                    format!("{CHUNKS_FILE} is missing"),
                ));
            }
            (false, true) => {
                return Err(Error::corrupt(
                    &self.location,
                    format!("{VECTORS_FILE} is missing"),
                ));
            }
            (true, true) => {}
        }

        let stored = read_vectors(&vectors_path)?;
        let chunks =
            read_chunks(&chunks_path, stored.count, &stored.fingerprint)?;

        let index = FlatIndex::from_parts(
            stored.model_id,
            stored.dimension,
            stored.vectors,
            chunks,
        )
        .map_err(|e| Error::corrupt(&self.location, e.to_string()))?;

        if fingerprint(&index)? != stored.fingerprint {
            return Err(Error::corrupt(
                &self.location,
                "fingerprint does not match contents",
            ));
        }

        debug!(
            location = %self.location.display(),
            chunks = index.len(),
            "loaded index"
        );
        Ok(Some(index))
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// blake3 digest over the model id, dimension, every vector and every
/// chunk, in position order.
fn fingerprint(index: &FlatIndex) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(index.model_id().as_bytes());
    hasher.update(&(index.dimension() as u64).to_le_bytes());
    for (row, chunk) in index.rows().zip(index.chunks()) {
        hasher.update(bytemuck::cast_slice(row));
        hasher.update(serde_json::to_string(chunk)?.as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn write_vectors(
    path: &Path,
    index: &FlatIndex,
    fingerprint: &str,
) -> Result<()> {
    let db = Database::create(path)?;
    let dimension = index.dimension().to_string();
    let count = index.len().to_string();

    let txn = db.begin_write()?;
    {
        let mut meta = txn.open_table(META)?;
        meta.insert(META_FORMAT, FORMAT_VERSION)?;
        meta.insert(META_MODEL_ID, index.model_id())?;
        meta.insert(META_DIMENSION, dimension.as_str())?;
        meta.insert(META_COUNT, count.as_str())?;
        meta.insert(META_FINGERPRINT, fingerprint)?;

        let mut table = txn.open_table(VECTORS)?;
        for (position, row) in index.rows().enumerate() {
            let bytes: &[u8] = bytemuck::cast_slice(row);
            let mut guard =
                table.insert_reserve(position as u64, bytes.len())?;
            guard.as_mut().copy_from_slice(bytes);
        }
    }
    txn.commit()?;
    Ok(())
}

fn write_chunks(
    path: &Path,
    index: &FlatIndex,
    fingerprint: &str,
) -> Result<()> {
    let db = Database::create(path)?;
    let count = index.len().to_string();

    let txn = db.begin_write()?;
    {
        let mut meta = txn.open_table(META)?;
        meta.insert(META_COUNT, count.as_str())?;
        meta.insert(META_FINGERPRINT, fingerprint)?;

        let mut table = txn.open_table(CHUNKS)?;
        for (position, chunk) in index.chunks().iter().enumerate() {
            let json = serde_json::to_string(chunk)?;
            table.insert(position as u64, json.as_str())?;
        }
    }
    txn.commit()?;
    Ok(())
}

struct StoredVectors {
    model_id: String,
    dimension: usize,
    count: usize,
    fingerprint: String,
    vectors: Vec<f32>,
}

/// Open read-only so concurrent loads only take shared file locks.
fn open_existing(path: &Path) -> Result<ReadOnlyDatabase> {
    ReadOnlyDatabase::open(path)
        .map_err(|e| Error::corrupt(path, e.to_string()))
}

fn meta_value(
    path: &Path,
    meta: &MetaTable,
    key: &str,
) -> Result<String> {
    meta.get(key)?
        .map(|v| v.value().to_string())
        .ok_or_else(|| Error::corrupt(path, format!("missing meta key {key}")))
}

fn meta_number(
    path: &Path,
    meta: &MetaTable,
    key: &str,
) -> Result<usize> {
    let raw = meta_value(path, meta, key)?;
    raw.parse().map_err(|_| {
        Error::corrupt(path, format!("{key} is not a number: {raw}"))
    })
}

fn read_vectors(path: &Path) -> Result<StoredVectors> {
    let db = open_existing(path)?;
    let txn = db.begin_read()?;
    let meta = txn
        .open_table(META)
        .map_err(|e| Error::corrupt(path, e.to_string()))?;

    let format = meta_value(path, &meta, META_FORMAT)?;
    if format != FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!("unknown format version {format}"),
        ));
    }
    let model_id = meta_value(path, &meta, META_MODEL_ID)?;
    let dimension = meta_number(path, &meta, META_DIMENSION)?;
    let count = meta_number(path, &meta, META_COUNT)?;
    let fingerprint = meta_value(path, &meta, META_FINGERPRINT)?;

    let table = txn
        .open_table(VECTORS)
        .map_err(|e| Error::corrupt(path, e.to_string()))?;
    if table.len()? != count as u64 {
        return Err(Error::corrupt(
            path,
            format!("expected {count} vectors, found {}", table.len()?),
        ));
    }

    if dimension == 0 {
        return Err(Error::corrupt(path, "dimension is zero"));
    }
    let row_bytes = dimension
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| {
            Error::corrupt(path, format!("dimension {dimension} is too large"))
        })?;
    if count.checked_mul(row_bytes).is_none() {
        return Err(Error::corrupt(
            path,
            format!("{count} vectors of dimension {dimension} overflow"),
        ));
    }

    // Grows row by row; every row length is checked before it is kept.
    let mut vectors = Vec::new();
    for position in 0..count as u64 {
        let guard = table.get(position)?.ok_or_else(|| {
            Error::corrupt(path, format!("vector {position} is missing"))
        })?;
        let bytes = guard.value();
        if bytes.len() != row_bytes {
            return Err(Error::corrupt(
                path,
                format!(
                    "vector {position} has {} bytes, expected {row_bytes}",
                    bytes.len()
                ),
            ));
        }
        // Stored bytes carry no alignment guarantee.
        vectors.extend(bytemuck::pod_collect_to_vec::<u8, f32>(bytes));
    }

    Ok(StoredVectors {
        model_id,
        dimension,
        count,
        fingerprint,
        vectors,
    })
}

fn read_chunks(
    path: &Path,
    expected_count: usize,
    expected_fingerprint: &str,
) -> Result<Vec<Chunk>> {
    let db = open_existing(path)?;
    let txn = db.begin_read()?;
    let meta = txn
        .open_table(META)
        .map_err(|e| Error::corrupt(path, e.to_string()))?;

    let count = meta_number(path, &meta, META_COUNT)?;
    if count != expected_count {
        return Err(Error::corrupt(
            path,
            format!(
                "holds {count} chunks but there are {expected_count} vectors"
            ),
        ));
    }
    if meta_value(path, &meta, META_FINGERPRINT)? != expected_fingerprint {
        return Err(Error::corrupt(
            path,
            "chunks and vectors come from different builds",
        ));
    }

    let table = txn
        .open_table(CHUNKS)
        .map_err(|e| Error::corrupt(path, e.to_string()))?;
    if table.len()? != count as u64 {
        return Err(Error::corrupt(
            path,
            format!("expected {count} chunks, found {}", table.len()?),
        ));
    }

    let mut chunks = Vec::with_capacity(count);
    for position in 0..count as u64 {
        let guard = table.get(position)?.ok_or_else(|| {
            Error::corrupt(path, format!("chunk {position} is missing"))
        })?;
        let chunk: Chunk = serde_json::from_str(guard.value()).map_err(|e| {
            Error::corrupt(path, format!("chunk {position} is unreadable: {e}"))
        })?;
        chunks.push(chunk);
    }
    Ok(chunks)
}
