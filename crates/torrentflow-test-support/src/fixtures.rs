//! Descriptor fixtures and scratch directories.
//!
//! Descriptors are encoded here with `serde_bencode` values rather than the
//! production encoder so tests cross-check hashes computed by two paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use tempfile::TempDir;

/// Fresh temporary directory removed on drop.
///
/// # Panics
///
/// Panics if the OS refuses to create a temporary directory.
#[must_use]
pub fn scratch_dir() -> TempDir {
    tempfile::tempdir().expect("temporary directory")
}

/// One payload file inside a fixture.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    /// Path segments below the transfer directory.
    pub path: Vec<String>,
    /// File contents.
    pub contents: Vec<u8>,
}

impl FixtureFile {
    /// Build a file from path segments and contents.
    #[must_use]
    pub fn new(path: &[&str], contents: Vec<u8>) -> Self {
        Self {
            path: path.iter().map(ToString::to_string).collect(),
            contents,
        }
    }
}

/// Builder for `.torrent` descriptors with real piece hashes.
#[derive(Debug, Clone)]
pub struct DescriptorFixture {
    name: String,
    piece_length: u64,
    files: Vec<FixtureFile>,
    single_file: bool,
    trackers: Vec<String>,
}

impl DescriptorFixture {
    /// Multi-file descriptor with no files yet.
    #[must_use]
    pub fn new(name: &str, piece_length: u64) -> Self {
        Self {
            name: name.to_string(),
            piece_length,
            files: Vec::new(),
            single_file: false,
            trackers: Vec::new(),
        }
    }

    /// Single-file descriptor whose file is named after the transfer.
    #[must_use]
    pub fn single(name: &str, piece_length: u64, contents: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            piece_length,
            files: vec![FixtureFile::new(&[name], contents)],
            single_file: true,
            trackers: Vec::new(),
        }
    }

    /// Append a file (multi-file layout only).
    #[must_use]
    pub fn with_file(mut self, file: FixtureFile) -> Self {
        self.files.push(file);
        self
    }

    /// Append an announce URL.
    #[must_use]
    pub fn with_tracker(mut self, url: &str) -> Self {
        self.trackers.push(url.to_string());
        self
    }

    /// Transfer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total payload length.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.contents.len() as u64).sum()
    }

    /// Encoded info dictionary.
    ///
    /// # Panics
    ///
    /// Panics if `serde_bencode` cannot encode a value tree.
    #[must_use]
    pub fn info_bytes(&self) -> Vec<u8> {
        serde_bencode::to_bytes(&self.info_value()).expect("info encodes")
    }

    /// SHA-1 of [`Self::info_bytes`].
    #[must_use]
    pub fn info_hash(&self) -> [u8; 20] {
        let digest = Sha1::digest(self.info_bytes());
        let mut out = [0_u8; 20];
        out.copy_from_slice(&digest);
        out
    }

    /// Lowercase hex rendering of [`Self::info_hash`].
    #[must_use]
    pub fn info_hash_hex(&self) -> String {
        self.info_hash()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }

    /// Full descriptor bytes.
    ///
    /// # Panics
    ///
    /// Panics if `serde_bencode` cannot encode a value tree.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut root = HashMap::new();
        root.insert(b"info".to_vec(), self.info_value());
        if let Some(first) = self.trackers.first() {
            root.insert(b"announce".to_vec(), bytes(first));
            root.insert(
                b"announce-list".to_vec(),
                Value::List(vec![Value::List(
                    self.trackers.iter().map(|url| bytes(url)).collect(),
                )]),
            );
        }
        serde_bencode::to_bytes(&Value::Dict(root)).expect("descriptor encodes")
    }

    /// Write the descriptor to `dir/<name>.torrent`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn write_descriptor(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.torrent", self.name));
        std::fs::write(&path, self.encode()).expect("descriptor written");
        path
    }

    /// Materialise payload files below `download_dir` using the layout the
    /// descriptor implies, returning their paths.
    ///
    /// # Panics
    ///
    /// Panics if a directory or file cannot be created.
    #[must_use]
    pub fn write_payload(&self, download_dir: &Path) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|file| {
                let path = if self.single_file {
                    download_dir.join(&self.name)
                } else {
                    let mut path = download_dir.join(&self.name);
                    path.extend(file.path.iter());
                    path
                };
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).expect("payload directory");
                }
                std::fs::write(&path, &file.contents).expect("payload written");
                path
            })
            .collect()
    }

    fn info_value(&self) -> Value {
        let mut info = HashMap::new();
        info.insert(b"name".to_vec(), bytes(&self.name));
        info.insert(
            b"piece length".to_vec(),
            Value::Int(i64::try_from(self.piece_length).expect("piece length fits i64")),
        );
        info.insert(b"pieces".to_vec(), Value::Bytes(self.piece_hashes()));
        if self.single_file {
            info.insert(b"length".to_vec(), int(self.total_length()));
        } else {
            let files = self
                .files
                .iter()
                .map(|file| {
                    let mut entry = HashMap::new();
                    entry.insert(b"length".to_vec(), int(file.contents.len() as u64));
                    entry.insert(
                        b"path".to_vec(),
                        Value::List(file.path.iter().map(|segment| bytes(segment)).collect()),
                    );
                    Value::Dict(entry)
                })
                .collect();
            info.insert(b"files".to_vec(), Value::List(files));
        }
        Value::Dict(info)
    }

    fn piece_hashes(&self) -> Vec<u8> {
        let payload: Vec<u8> = self
            .files
            .iter()
            .flat_map(|file| file.contents.iter().copied())
            .collect();
        let piece_length = usize::try_from(self.piece_length).expect("piece length fits usize");
        payload
            .chunks(piece_length)
            .flat_map(|piece| Sha1::digest(piece).to_vec())
            .collect()
    }
}

fn bytes(text: &str) -> Value {
    Value::Bytes(text.as_bytes().to_vec())
}

fn int(value: u64) -> Value {
    Value::Int(i64::try_from(value).expect("length fits i64"))
}
