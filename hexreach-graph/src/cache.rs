//! On-disk graph cache.
//!
//! Layout per `(source, mode)` pair, under the cache root:
//!
//! ```text
//! <root>/<source-stem>-<mode>/
//!     indptr.bin        raw little-endian u32 array
//!     indices.bin       raw little-endian u32 array
//!     weights.bin       raw little-endian u32 array
//!     node_lonlat.bin   raw little-endian f32 array, interleaved
//!     meta.json         provenance + per-file CRC32 checksums
//! ```
//!
//! A cache is valid only if the recorded source mtime/hash and both
//! version stamps agree with the live source and code. Staleness
//! triggers a rebuild; a corrupt cache gets exactly one automatic
//! rebuild attempt before the error surfaces. Rebuilds go through a
//! temp directory and a rename, guarded by a lock file; readers never
//! take the lock.

use crate::csr::CsrGraph;
use crate::profile::PROFILE_VERSION;
use crate::{GraphError, TravelMode, loader};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};
use xxhash_rust::xxh3::Xxh3;
use zerocopy::IntoBytes;

/// Bumped whenever the binary array layout changes.
pub const GRAPH_VERSION: u32 = 2;

const FILE_INDPTR: &str = "indptr.bin";
const FILE_INDICES: &str = "indices.bin";
const FILE_WEIGHTS: &str = "weights.bin";
const FILE_LONLAT: &str = "node_lonlat.bin";
const FILE_META: &str = "meta.json";
const LOCK_FILE: &str = "rebuild.lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheMeta {
    pub source_file_name: String,
    /// Unix seconds. `None` (e.g. hand-edited meta) invalidates the cache.
    pub source_mtime: Option<u64>,
    /// XXH3-64 of the source file, hex. `None` invalidates the cache.
    pub source_hash: Option<String>,
    pub mode: TravelMode,
    pub profile_version: u32,
    pub graph_version: u32,
    pub build_time: String,
    /// CRC32 per binary file name.
    pub checksums: BTreeMap<String, u32>,
}

pub struct GraphCache {
    root: PathBuf,
}

impl GraphCache {
    pub fn new(root: impl Into<PathBuf>) -> GraphCache {
        GraphCache { root: root.into() }
    }

    /// The cache directory for a `(source, mode)` pair.
    pub fn cache_dir(&self, source: &Path, mode: TravelMode) -> PathBuf {
        let stem = source
            .file_stem()
            .map_or_else(|| "graph".to_string(), |s| s.to_string_lossy().into_owned());
        self.root.join(format!("{stem}-{mode}"))
    }

    /// Returns the cached graph if valid, otherwise rebuilds from source.
    ///
    /// # Errors
    ///
    /// - [`GraphError::SourceMissing`] / [`GraphError::SourceUnreadable`]
    ///   if the extract is absent or malformed.
    /// - [`GraphError::CacheCorrupt`] if the cache fails integrity checks
    ///   and the automatic rebuild attempt also fails.
    /// - [`GraphError::CacheLocked`] if another process holds the rebuild
    ///   lock.
    pub fn load_or_build(&self, source: &Path, mode: TravelMode) -> Result<CsrGraph, GraphError> {
        let dir = self.cache_dir(source, mode);
        match self.try_load(&dir, source, mode) {
            Ok(Some(graph)) => {
                info!(dir = %dir.display(), "loaded graph from cache");
                return Ok(graph);
            }
            Ok(None) => {
                info!(dir = %dir.display(), "cache missing or stale, rebuilding");
            }
            Err(GraphError::CacheCorrupt(reason)) => {
                warn!(reason, "cache corrupt, attempting one rebuild");
            }
            Err(e) => return Err(e),
        }
        self.rebuild(&dir, source, mode)
    }

    /// `Ok(None)` means absent or stale (rebuild silently);
    /// `Err(CacheCorrupt)` means the files are damaged.
    fn try_load(
        &self,
        dir: &Path,
        source: &Path,
        mode: TravelMode,
    ) -> Result<Option<CsrGraph>, GraphError> {
        let meta_path = dir.join(FILE_META);
        if !meta_path.is_file() {
            return Ok(None);
        }
        let meta: CacheMeta = serde_json::from_slice(&fs::read(&meta_path)?)
            .map_err(|e| GraphError::CacheCorrupt(format!("unreadable meta.json: {e}")))?;

        if meta.mode != mode
            || meta.profile_version != PROFILE_VERSION
            || meta.graph_version != GRAPH_VERSION
        {
            return Ok(None);
        }
        let (Some(recorded_mtime), Some(recorded_hash)) = (meta.source_mtime, &meta.source_hash)
        else {
            return Ok(None);
        };
        if source_mtime(source)? > recorded_mtime || &xxh3_file_hex(source)? != recorded_hash {
            return Ok(None);
        }

        let mut maps = Vec::with_capacity(4);
        for name in [FILE_INDPTR, FILE_INDICES, FILE_WEIGHTS, FILE_LONLAT] {
            let path = dir.join(name);
            let file = File::open(&path)
                .map_err(|e| GraphError::CacheCorrupt(format!("{name} unreadable: {e}")))?;
            // SAFETY: the cache directory is owned by this process family;
            // concurrent writers go through the temp-dir + rename protocol.
            let map = unsafe { Mmap::map(&file) }
                .map_err(|e| GraphError::CacheCorrupt(format!("{name} mmap failed: {e}")))?;
            let expected = *meta
                .checksums
                .get(name)
                .ok_or_else(|| GraphError::CacheCorrupt(format!("{name} missing checksum")))?;
            let actual = crc32fast::hash(&map);
            if actual != expected {
                return Err(GraphError::CacheCorrupt(format!(
                    "{name} checksum mismatch (expected {expected:08x}, found {actual:08x})"
                )));
            }
            maps.push(map);
        }
        let lonlat = maps.pop().expect("four maps pushed");
        let weights = maps.pop().expect("four maps pushed");
        let indices = maps.pop().expect("four maps pushed");
        let indptr = maps.pop().expect("four maps pushed");
        CsrGraph::from_maps(mode, indptr, indices, weights, lonlat).map(Some)
    }

    fn rebuild(&self, dir: &Path, source: &Path, mode: TravelMode) -> Result<CsrGraph, GraphError> {
        fs::create_dir_all(&self.root)?;
        let _lock = RebuildLock::acquire(&self.root)?;

        let graph = loader::load_graph(source, mode)?;
        let meta = CacheMeta {
            source_file_name: source
                .file_name()
                .map_or_else(String::new, |s| s.to_string_lossy().into_owned()),
            source_mtime: Some(source_mtime(source)?),
            source_hash: Some(xxh3_file_hex(source)?),
            mode,
            profile_version: PROFILE_VERSION,
            graph_version: GRAPH_VERSION,
            build_time: chrono::Utc::now().to_rfc3339(),
            checksums: BTreeMap::new(),
        };
        store_graph(&self.root, dir, &graph, meta)?;
        Ok(graph)
    }
}

/// Writes the graph and its metadata to `dir` atomically: all files land
/// in a temp directory first, then a single rename publishes them.
pub(crate) fn store_graph(
    root: &Path,
    dir: &Path,
    graph: &CsrGraph,
    mut meta: CacheMeta,
) -> Result<(), GraphError> {
    let tmp = tempfile::Builder::new()
        .prefix(".graph-build-")
        .tempdir_in(root)?;

    for (name, bytes) in [
        (FILE_INDPTR, graph.indptr().as_bytes()),
        (FILE_INDICES, graph.indices().as_bytes()),
        (FILE_WEIGHTS, graph.weights().as_bytes()),
        (FILE_LONLAT, graph.lonlat_flat().as_bytes()),
    ] {
        let crc = write_synced(&tmp.path().join(name), bytes)?;
        meta.checksums.insert(name.to_string(), crc);
    }
    write_synced(&tmp.path().join(FILE_META), &serde_json::to_vec_pretty(&meta)?)?;

    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(tmp.keep(), dir)?;
    info!(dir = %dir.display(), "graph cache written");
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<u32, GraphError> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(crc32fast::hash(bytes))
}

fn source_mtime(source: &Path) -> Result<u64, GraphError> {
    let modified = fs::metadata(source)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

fn xxh3_file_hex(path: &Path) -> Result<String, GraphError> {
    let mut hasher = Xxh3::new();
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:016x}", hasher.digest()))
}

/// Exclusive writer lock for cache rebuilds. Created with `create_new`
/// so a crashed writer leaves a stale lock visible to the operator
/// rather than silently interleaving writes.
struct RebuildLock {
    path: PathBuf,
}

impl RebuildLock {
    fn acquire(root: &Path) -> Result<RebuildLock, GraphError> {
        let path = root.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(RebuildLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(GraphError::CacheLocked)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
