// tests/integration_test.rs

//! Integration tests for archdeps
//!
//! These tests drive the whole pipeline: configuration, mirror download,
//! archive decoding, cross-referencing and resolution.

use archdeps::config::Config;
use archdeps::packages::{DescFlags, desc};
use archdeps::repository::{Fetcher, JobPool, SyncMode, Synchronizer};
use archdeps::resolver::Resolver;
use archdeps::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct StaticMirror {
    files: HashMap<String, Vec<u8>>,
    hits: Mutex<Vec<String>>,
}

impl Fetcher for StaticMirror {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.hits.lock().unwrap().push(url.to_string());
        self.files
            .get(url)
            .map(|body| Box::new(Cursor::new(body.clone())) as Box<dyn Read + Send>)
            .ok_or_else(|| Error::DownloadError(format!("HTTP 404 Not Found from {}", url)))
    }
}

fn record(fields: &[(&str, &[&str])]) -> String {
    let mut out = String::new();
    for (field, values) in fields {
        out.push_str(&format!("%{}%\n", field));
        for v in *values {
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn tar_of(records: &[String]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (i, body) in records.iter().enumerate() {
        let mut header = tar::Header::new_ustar();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, format!("pkg-{}/desc", i), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn write_config(root: &Path) -> std::path::PathBuf {
    let mirrorlist = root.join("mirrorlist");
    fs::write(
        &mirrorlist,
        "# test mirrors\nServer = https://down.example.org/$repo/os/$arch\nServer = https://up.example.org/$repo/os/$arch\n",
    )
    .unwrap();

    let config = root.join("config.json");
    let text = serde_json::json!({
        "options": {
            "arch": "x86_64",
            "parallel": 2,
            "db": root.join("sync"),
            "local": root.join("local"),
        },
        "repository": [
            { "name": "core", "path": mirrorlist },
            { "name": "extra", "path": mirrorlist },
        ]
    });
    fs::write(&config, text.to_string()).unwrap();
    config
}

fn write_local(root: &Path, packages: &[(&str, &str, &str)]) {
    fs::create_dir_all(root.join("local")).unwrap();
    for &(name, version, reason) in packages {
        let dir = root.join("local").join(format!("{}-{}", name, version));
        fs::create_dir_all(&dir).unwrap();
        let body = record(&[("NAME", &[name]), ("VERSION", &[version]), ("REASON", &[reason])]);
        fs::write(dir.join("desc"), body).unwrap();
    }
}

fn mirror() -> StaticMirror {
    let core = tar_of(&[
        record(&[("NAME", &["glibc"]), ("VERSION", &["2.40-1"])]),
        record(&[
            ("NAME", &["bash"]),
            ("VERSION", &["5.2.037-1"]),
            ("DEPENDS", &["readline>=8.0", "glibc"]),
            ("PROVIDES", &["sh"]),
        ]),
        record(&[("NAME", &["readline"]), ("VERSION", &["7.0-1"])]),
        record(&[("NAME", &["readline"]), ("VERSION", &["8.2.013-1"]), ("DEPENDS", &["glibc"])]),
    ]);
    let extra = tar_of(&[
        record(&[
            ("NAME", &["htop"]),
            ("VERSION", &["3.3.0-1"]),
            ("DESC", &["Interactive process viewer"]),
            ("DEPENDS", &["sh", "libnl"]),
        ]),
        record(&[("NAME", &["libnl"]), ("VERSION", &["3.10.0-1"])]),
    ]);

    let mut files = HashMap::new();
    files.insert("https://up.example.org/lastsync".to_string(), b"1700000000\n".to_vec());
    files.insert("https://up.example.org/core/os/x86_64/core.db".to_string(), gzip(&core));
    files.insert(
        "https://up.example.org/extra/os/x86_64/extra.db".to_string(),
        zstd::encode_all(&extra[..], 3).unwrap(),
    );
    StaticMirror {
        files,
        hits: Mutex::new(Vec::new()),
    }
}

#[test]
fn test_sync_and_resolve() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path());
    write_local(
        tmp.path(),
        &[("htop", "3.2.0-1", "0"), ("glibc", "2.39-1", "1"), ("oldtool", "1-1", "0")],
    );

    let config = Config::load(&config_path, None).unwrap();
    assert_eq!(config.repositories.len(), 2);

    let fetcher = Arc::new(mirror());
    let pool = JobPool::new(config.options.parallel, config.options.queue_capacity()).unwrap();
    let mut catalog = Synchronizer::new(&config, fetcher.clone())
        .with_mode(SyncMode::Auto)
        .run(&pool)
        .unwrap();

    // Both archives were cached under the configured db directory
    assert!(tmp.path().join("sync/core.db").is_file());
    assert!(tmp.path().join("sync/extra.db").is_file());

    let oldtool = catalog.local.find_canonical("oldtool").unwrap();
    assert!(catalog.local.get(oldtool).unwrap().flags.contains(DescFlags::REMOVED));

    let set = Resolver::new().resolve(&mut catalog).unwrap();
    let names: Vec<String> = set.packages.iter().map(|p| p.to_string()).collect();
    assert_eq!(set.len(), 5, "{:?}", names);
    assert!(set.contains("htop", "3.3.0-1"));
    assert!(set.contains("bash", "5.2.037-1"));
    assert!(set.contains("readline", "8.2.013-1"));
    assert!(!set.contains("readline", "7.0-1"));
    assert!(set.contains("glibc", "2.40-1"));
    assert!(set.contains("libnl", "3.10.0-1"));

    let hits = catalog.search("process viewer");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].repository, "extra");
    assert!(hits[0].installed);

    // A second, offline run reads the cache without touching the mirrors
    let before = fetcher.hits.lock().unwrap().len();
    let again = Synchronizer::new(&config, fetcher.clone())
        .with_mode(SyncMode::Offline)
        .run(&pool)
        .unwrap();
    assert_eq!(again.upstream[1].len(), catalog.upstream[1].len());
    assert_eq!(fetcher.hits.lock().unwrap().len(), before);
}

#[test]
fn test_unsatisfiable_version_constraint() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path());
    write_local(tmp.path(), &[("bash", "5.2-1", "0")]);

    let mut fetcher = mirror();
    let core = tar_of(&[
        record(&[("NAME", &["bash"]), ("VERSION", &["5.2.037-1"]), ("DEPENDS", &["readline>=9"])]),
        record(&[("NAME", &["readline"]), ("VERSION", &["8.2.013-1"])]),
    ]);
    fetcher.files.insert(
        "https://up.example.org/core/os/x86_64/core.db".to_string(),
        gzip(&core),
    );

    let config = Config::load(&config_path, None).unwrap();
    let pool = JobPool::new(1, 2).unwrap();
    let mut catalog = Synchronizer::new(&config, Arc::new(fetcher))
        .run(&pool)
        .unwrap();

    let err = Resolver::new().resolve(&mut catalog).unwrap_err();
    assert!(matches!(err, Error::MissingCandidate { .. }));
    assert!(err.to_string().contains("readline>=9"));
}

#[test]
fn test_corrupt_archive_fails_whole_run() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path());
    write_local(tmp.path(), &[]);

    let mut fetcher = mirror();
    let mut core = tar_of(&[record(&[("NAME", &["glibc"]), ("VERSION", &["2.40-1"])])]);
    core[148] ^= 0x01;
    fetcher.files.insert(
        "https://up.example.org/core/os/x86_64/core.db".to_string(),
        gzip(&core),
    );

    let config = Config::load(&config_path, None).unwrap();
    let pool = JobPool::new(2, 4).unwrap();
    let result = Synchronizer::new(&config, Arc::new(fetcher)).run(&pool);
    assert!(matches!(result, Err(Error::Tar(_))));
}

#[test]
fn test_descriptor_round_trip() {
    let text = record(&[
        ("NAME", &["python-requests"]),
        ("VERSION", &["2.32.3-1"]),
        ("DESC", &["Python HTTP for Humans"]),
        ("DEPENDS", &["python-urllib3", "python-idna"]),
        ("OPTDEPENDS", &["python-pysocks: SOCKS proxy support"]),
        ("SIZE", &["123456"]),
    ]);
    let parsed = desc::parse(text.as_bytes()).unwrap();
    let again = desc::parse(desc::encode(&parsed).as_bytes()).unwrap();
    assert_eq!(parsed, again);
    assert_eq!(again.opt_depends[0].description.as_deref(), Some("SOCKS proxy support"));
}
