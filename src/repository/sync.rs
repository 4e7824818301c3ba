// src/repository/sync.rs

//! Building the catalog from the local tree and every configured repository
//!
//! One job loads the installed-package tree and one job per upstream
//! repository loads its database archive, either from the on-disk cache or
//! from a mirror. Every job owns the database it builds and hands it back over
//! a channel. Once all jobs have joined, the local entries are cross-referenced
//! against the upstream databases.

use super::{Fetcher, JobPool, format_timestamp, probe_lastsync};
use crate::archive::decompress::{READ_CHUNK, StreamDecoder, decompress_reader};
use crate::archive::tar::{EntryKind, TarReader};
use crate::config::{Config, Repository};
use crate::db::{Catalog, Origin, PackageDatabase, Storage};
use crate::error::{Error, Result};
use crate::packages::{DescFlags, desc};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// When cached repository archives are refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Download when the cache is older than the mirrors' `lastsync`
    #[default]
    Auto,
    /// Never touch the network
    Offline,
    /// Always download
    Force,
}

/// Which database a finished job produced
#[derive(Debug, Clone, Copy)]
enum Slot {
    Local,
    Upstream(usize),
}

/// Drives one synchronization run
pub struct Synchronizer {
    fetcher: Arc<dyn Fetcher>,
    db_dir: PathBuf,
    local_dir: PathBuf,
    repositories: Vec<Repository>,
    mode: SyncMode,
}

impl Synchronizer {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            db_dir: config.options.db.clone(),
            local_dir: config.options.local.clone(),
            repositories: config.repositories.clone(),
            mode: SyncMode::Auto,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load every database on `pool` and cross-reference the result.
    ///
    /// Any failing job fails the whole run; no partial catalog is returned.
    pub fn run(&self, pool: &JobPool) -> Result<Catalog> {
        let lastsync = match self.mode {
            SyncMode::Offline => None,
            _ => self
                .repositories
                .first()
                .and_then(|r| probe_lastsync(self.fetcher.as_ref(), &r.servers)),
        };

        info!(
            "Synchronizing {} repositories ({:?})",
            self.repositories.len(),
            self.mode
        );

        let (tx, rx) = mpsc::channel::<(Slot, Result<PackageDatabase>)>();

        let local_dir = self.local_dir.clone();
        let local_tx = tx.clone();
        pool.submit(move || {
            let _ = local_tx.send((Slot::Local, load_local(&local_dir)));
        });

        for (i, repo) in self.repositories.iter().enumerate() {
            let job = RepoJob {
                repo: repo.clone(),
                db_dir: self.db_dir.clone(),
                fetcher: Arc::clone(&self.fetcher),
                mode: self.mode,
                lastsync,
            };
            let tx = tx.clone();
            pool.submit(move || {
                let _ = tx.send((Slot::Upstream(i), job.run()));
            });
        }
        drop(tx);
        pool.wait();

        let mut local = None;
        let mut upstream: Vec<Option<PackageDatabase>> =
            (0..self.repositories.len()).map(|_| None).collect();
        for (slot, result) in rx {
            let db = result?;
            match slot {
                Slot::Local => local = Some(db),
                Slot::Upstream(i) => upstream[i] = Some(db),
            }
        }

        let local = local.ok_or_else(|| Error::Internal("local sync job vanished".to_string()))?;
        let upstream = upstream
            .into_iter()
            .zip(&self.repositories)
            .map(|(db, repo)| {
                db.ok_or_else(|| Error::Internal(format!("sync job for {} vanished", repo.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut catalog = Catalog::new(local, upstream);
        catalog.cross_reference();
        Ok(catalog)
    }
}

/// Read `<local>/*/desc` into a per-entry database
pub fn load_local(dir: &Path) -> Result<PackageDatabase> {
    info!("Loading installed packages from {}", dir.display());
    let mut db = PackageDatabase::new("local", Origin::Local, Storage::PerEntry);

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Unable to open {}: {}", dir.display(), e),
        ))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        // Plain files such as ALPM_DB_VERSION sit next to the package directories
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    for path in dirs {
        let desc_path = path.join("desc");
        let data = fs::read(&desc_path).map_err(|e| {
            error!("Installed package {} has no readable desc", path.display());
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Unable to read {}: {}", desc_path.display(), e),
            ))
        })?;
        let mut desc = desc::parse(&data).inspect_err(|e| {
            error!("Malformed descriptor {}: {}", desc_path.display(), e);
        })?;
        if desc.looks_locally_built() {
            desc.flags.insert(DescFlags::LOCALLY_BUILT);
        }
        db.insert(desc);
    }

    info!("Loaded {} installed packages", db.len());
    Ok(db)
}

/// Index every regular file of a decompressed repository archive
pub fn load_archive(name: &str, data: &[u8]) -> Result<PackageDatabase> {
    let mut db = PackageDatabase::new(name, Origin::Upstream, Storage::Archive);
    let mut reader = TarReader::new(data);

    for entry in reader.by_ref() {
        if entry.kind != EntryKind::Regular {
            continue;
        }
        let desc = desc::parse(entry.data).inspect_err(|e| {
            error!("Malformed descriptor {}/{}: {}", name, entry.path, e);
        })?;
        db.insert_with_aliases(desc);
    }
    reader.status()?;

    if db.is_empty() {
        return Err(Error::Internal(format!("repository {} holds no packages", name)));
    }
    info!("Loaded {} descriptors from {}", db.len(), name);
    Ok(db)
}

/// Cached archives older than `lastsync` need a download
fn needs_refresh(cached: &Path, lastsync: Option<i64>) -> bool {
    let Some(cached_at) = modified_secs(cached) else {
        return true;
    };
    let Some(lastsync) = lastsync else {
        return false;
    };
    if cached_at < lastsync {
        debug!(
            "{} is stale ({} < {})",
            cached.display(),
            format_timestamp(cached_at),
            format_timestamp(lastsync)
        );
        return true;
    }
    false
}

struct RepoJob {
    repo: Repository,
    db_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    mode: SyncMode,
    lastsync: Option<i64>,
}

impl RepoJob {
    fn file_name(&self) -> String {
        format!("{}.db", self.repo.name)
    }

    fn run(&self) -> Result<PackageDatabase> {
        info!("Syncing {}", self.repo.name);
        let cached = self.db_dir.join(self.file_name());

        let download = match self.mode {
            SyncMode::Offline => false,
            SyncMode::Force => true,
            SyncMode::Auto => needs_refresh(&cached, self.lastsync),
        };

        let data = if download {
            None
        } else {
            self.load_cached(&cached)
        };
        let data = match data {
            Some(data) => data,
            None if self.mode == SyncMode::Offline => {
                return Err(Error::DownloadError(format!(
                    "{} is not cached and downloads are disabled",
                    self.repo.name
                )));
            }
            None => self.download(&cached)?,
        };

        load_archive(&self.repo.name, &data)
    }

    fn load_cached(&self, cached: &Path) -> Option<Vec<u8>> {
        let file = match File::open(cached) {
            Ok(file) => file,
            Err(e) => {
                debug!("No usable cache at {}: {}", cached.display(), e);
                return None;
            }
        };
        match decompress_reader(file) {
            Ok(data) => {
                debug!("Using cached {}", cached.display());
                Some(data)
            }
            Err(e) => {
                warn!("Cached {} is unreadable, downloading: {}", cached.display(), e);
                None
            }
        }
    }

    /// Try each mirror in turn, staging the archive next to the cache
    fn download(&self, cached: &Path) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.db_dir)?;
        let file_name = self.file_name();
        let mut decoder = StreamDecoder::new();

        for index in 0..self.repo.mirrors.len() {
            let Some(url) = self.repo.mirror_url(index, &file_name) else {
                continue;
            };

            let mut staging = tempfile::Builder::new()
                .prefix(&format!(".{}.", file_name))
                .suffix(".download")
                .tempfile_in(&self.db_dir)?;

            match self.stream(&url, staging.as_file_mut(), &mut decoder) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!("Mirror {} failed for {}: {}", url, self.repo.name, e);
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            }

            let data = std::mem::take(&mut decoder).finish()?;
            staging.as_file_mut().sync_all()?;
            staging.persist(cached).map_err(|e| Error::Io(e.error))?;

            if let Some(stamp) = self.lastsync {
                let mtime = UNIX_EPOCH + Duration::from_secs(stamp.max(0) as u64);
                File::options().write(true).open(cached)?.set_modified(mtime)?;
            }

            info!("Downloaded {} from {}", self.repo.name, url);
            return Ok(data);
        }

        Err(Error::DownloadError(format!(
            "No mirror could provide {}",
            self.repo.name
        )))
    }

    /// Copy the body of `url` into `staging` while decompressing it
    fn stream(&self, url: &str, staging: &mut File, decoder: &mut StreamDecoder) -> Result<()> {
        let mut body = self.fetcher.fetch(url)?;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(Error::Timeout(format!("reading {}: {}", url, e)));
                }
                Err(e) => return Err(Error::DownloadError(format!("reading {}: {}", url, e))),
            };
            staging.write_all(&buf[..n])?;
            decoder.push(&buf[..n])?;
        }
        debug!("Received {} bytes from {}", decoder.consumed(), url);
        Ok(())
    }
}

/// Seconds since the epoch for a file's modification time
pub fn modified_secs(path: &Path) -> Option<i64> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}
