use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_bencode::value::Value;
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};
use torrentflow_events::InfoHash;

use super::{FileEntry, TransferMetadata};
use crate::error::{TransferError, TransferResult};

const PIECE_HASH_LEN: usize = 20;

/// Info dictionary as laid out on the wire. Fields are declared in bencode
/// key order.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct RawInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) files: Option<Vec<RawFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) length: Option<u64>,
    pub(super) name: String,
    #[serde(rename = "piece length")]
    pub(super) piece_length: u64,
    pub(super) pieces: ByteBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct RawFile {
    pub(super) length: u64,
    pub(super) path: Vec<String>,
}

/// Decoded `.torrent` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    info_hash: InfoHash,
    metadata: TransferMetadata,
    tracker_tiers: Vec<Vec<String>>,
    info_bytes: Vec<u8>,
}

impl Metainfo {
    /// Decode a bencoded descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ParseError`] when the input is not a valid
    /// descriptor.
    pub fn from_bytes(bytes: &[u8]) -> TransferResult<Self> {
        let root: Value = serde_bencode::from_bytes(bytes)
            .map_err(|err| TransferError::parse(format!("invalid bencode: {err}")))?;
        let Value::Dict(root) = root else {
            return Err(TransferError::parse("descriptor is not a dictionary"));
        };
        let info = root
            .get(b"info".as_slice())
            .ok_or_else(|| TransferError::parse("descriptor has no info dictionary"))?;
        if !matches!(info, Value::Dict(_)) {
            return Err(TransferError::parse("info is not a dictionary"));
        }
        let info_bytes = serde_bencode::to_bytes(info)
            .map_err(|err| TransferError::parse(format!("info re-encoding failed: {err}")))?;
        Self::from_info_bytes(info_bytes, tracker_tiers(&root))
    }

    /// Read and decode a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::DescriptorNotFound`] when the file does not
    /// exist and [`TransferError::ParseError`] when it cannot be read or
    /// decoded.
    pub async fn load(path: &Path) -> TransferResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                TransferError::DescriptorNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                TransferError::parse(format!("read failed: {err}")).with_path(path.to_path_buf())
            }
        })?;
        Self::from_bytes(&bytes).map_err(|err| err.with_path(path.to_path_buf()))
    }

    /// Build from an already-encoded info dictionary.
    pub(super) fn from_info_bytes(
        info_bytes: Vec<u8>,
        tracker_tiers: Vec<Vec<String>>,
    ) -> TransferResult<Self> {
        let raw: RawInfo = serde_bencode::from_bytes(&info_bytes)
            .map_err(|err| TransferError::parse(format!("malformed info dictionary: {err}")))?;
        let metadata = metadata_from_raw(raw)?;
        let digest = Sha1::digest(&info_bytes);
        let mut hash = [0_u8; InfoHash::LEN];
        hash.copy_from_slice(&digest);
        let info_hash = InfoHash::from_bytes(hash);
        Ok(Self {
            info_hash,
            metadata,
            tracker_tiers,
            info_bytes,
        })
    }

    /// SHA-1 of the bencoded info dictionary.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Name, piece layout, and files.
    #[must_use]
    pub const fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    /// Announce URLs grouped in tiers.
    #[must_use]
    pub fn tracker_tiers(&self) -> &[Vec<String>] {
        &self.tracker_tiers
    }

    /// Exact info dictionary bytes the hash was computed over.
    #[must_use]
    pub fn info_bytes(&self) -> &[u8] {
        &self.info_bytes
    }

    /// Encode a complete descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ParseError`] if the stored info dictionary no
    /// longer decodes, which indicates memory corruption rather than bad input.
    pub fn to_bytes(&self) -> TransferResult<Vec<u8>> {
        let info: Value = serde_bencode::from_bytes(&self.info_bytes)
            .map_err(|err| TransferError::parse(format!("info decoding failed: {err}")))?;
        let mut root = HashMap::new();
        root.insert(b"info".to_vec(), info);
        if let Some(first) = self.tracker_tiers.iter().flatten().next() {
            root.insert(b"announce".to_vec(), Value::Bytes(first.clone().into_bytes()));
            let tiers = self
                .tracker_tiers
                .iter()
                .map(|tier| {
                    Value::List(
                        tier.iter()
                            .map(|url| Value::Bytes(url.clone().into_bytes()))
                            .collect(),
                    )
                })
                .collect();
            root.insert(b"announce-list".to_vec(), Value::List(tiers));
        }
        serde_bencode::to_bytes(&Value::Dict(root))
            .map_err(|err| TransferError::parse(format!("descriptor encoding failed: {err}")))
    }
}

fn metadata_from_raw(raw: RawInfo) -> TransferResult<TransferMetadata> {
    let name = raw.name.trim().to_string();
    if !is_safe_segment(&name) {
        return Err(TransferError::parse(format!("unsafe transfer name `{}`", raw.name)));
    }
    if raw.piece_length == 0 {
        return Err(TransferError::parse("piece length is zero"));
    }
    if raw.pieces.len() % PIECE_HASH_LEN != 0 {
        return Err(TransferError::parse(format!(
            "pieces length {} is not a multiple of {PIECE_HASH_LEN}",
            raw.pieces.len()
        )));
    }

    let files = match (raw.files, raw.length) {
        (Some(files), _) => files
            .into_iter()
            .map(|file| multi_file_entry(&name, file))
            .collect::<TransferResult<Vec<_>>>()?,
        (None, Some(length)) => vec![FileEntry {
            path: PathBuf::from(&name),
            display_name: name.clone(),
            length,
        }],
        (None, None) => {
            return Err(TransferError::parse("info has neither `length` nor `files`"));
        }
    };

    let piece_count = raw.pieces.len() / PIECE_HASH_LEN;
    let total: u64 = files.iter().map(|file| file.length).sum();
    let expected = total.div_ceil(raw.piece_length);
    if u64::try_from(piece_count).ok() != Some(expected) {
        return Err(TransferError::parse(format!(
            "{piece_count} piece hashes for {total} bytes at piece length {}",
            raw.piece_length
        )));
    }

    Ok(TransferMetadata {
        name,
        piece_length: raw.piece_length,
        piece_count,
        files,
    })
}

fn multi_file_entry(name: &str, file: RawFile) -> TransferResult<FileEntry> {
    if file.path.is_empty() {
        return Err(TransferError::parse("file entry has an empty path"));
    }
    if let Some(bad) = file.path.iter().find(|segment| !is_safe_segment(segment)) {
        return Err(TransferError::parse(format!("unsafe path segment `{bad}`")));
    }
    let mut path = PathBuf::from(name);
    path.extend(file.path.iter());
    Ok(FileEntry {
        path,
        display_name: file.path.join("/"),
        length: file.length,
    })
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

fn tracker_tiers(root: &HashMap<Vec<u8>, Value>) -> Vec<Vec<String>> {
    let mut tiers: Vec<Vec<String>> = match root.get(b"announce-list".as_slice()) {
        Some(Value::List(tiers)) => tiers
            .iter()
            .filter_map(|tier| match tier {
                Value::List(urls) => Some(urls.iter().filter_map(value_to_string).collect()),
                _ => None,
            })
            .filter(|tier: &Vec<String>| !tier.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    if tiers.is_empty()
        && let Some(announce) = root.get(b"announce".as_slice()).and_then(value_to_string)
    {
        tiers.push(vec![announce]);
    }
    tiers
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Bytes(bytes) => String::from_utf8(bytes.clone())
            .ok()
            .filter(|text| !text.trim().is_empty()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrentflow_test_support::fixtures::{DescriptorFixture, FixtureFile};

    fn album() -> DescriptorFixture {
        DescriptorFixture::new("album", 16_384)
            .with_file(FixtureFile::new(&["disc1", "01.flac"], vec![1; 20_000]))
            .with_file(FixtureFile::new(&["cover.jpg"], vec![2; 5_000]))
            .with_tracker("udp://tracker.example:80/announce")
    }

    #[test]
    fn multi_file_layout_and_hash() {
        let fixture = album();
        let metainfo = Metainfo::from_bytes(&fixture.encode()).expect("valid descriptor");

        assert_eq!(metainfo.info_hash().as_bytes(), &fixture.info_hash());
        let metadata = metainfo.metadata();
        assert_eq!(metadata.name, "album");
        assert_eq!(metadata.piece_count, 2);
        assert_eq!(metadata.total_length(), 25_000);
        assert_eq!(metadata.files[0].path, PathBuf::from("album/disc1/01.flac"));
        assert_eq!(metadata.files[0].display_name, "disc1/01.flac");
        assert_eq!(
            metainfo.tracker_tiers(),
            [vec!["udp://tracker.example:80/announce".to_string()]]
        );
    }

    #[test]
    fn single_file_layout_uses_name_as_path() {
        let fixture = DescriptorFixture::single("movie.mkv", 16_384, vec![9; 40_000]);
        let metainfo = Metainfo::from_bytes(&fixture.encode()).expect("valid descriptor");
        let files = &metainfo.metadata().files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("movie.mkv"));
        assert_eq!(files[0].length, 40_000);
    }

    #[test]
    fn encode_round_trip_preserves_hash() {
        let metainfo = Metainfo::from_bytes(&album().encode()).expect("valid descriptor");
        let again = Metainfo::from_bytes(&metainfo.to_bytes().expect("encodes")).expect("decodes");
        assert_eq!(again, metainfo);
    }

    #[test]
    fn rejects_malformed_descriptors() {
        let cases: [&[u8]; 4] = [
            b"not bencode",
            b"le",
            b"d8:announce3:urle",
            b"d4:infod4:name1:a12:piece lengthi16384e6:pieces3:abc6:lengthi1eee",
        ];
        for bytes in cases {
            let err = Metainfo::from_bytes(bytes).expect_err("malformed");
            assert_eq!(err.code(), "parse_error");
        }
    }

    #[test]
    fn rejects_path_traversal() {
        let fixture = DescriptorFixture::new("evil", 16_384)
            .with_file(FixtureFile::new(&["..", "passwd"], vec![0; 10]));
        let err = Metainfo::from_bytes(&fixture.encode()).expect_err("unsafe path");
        assert!(matches!(err, TransferError::ParseError { ref reason, .. } if reason.contains("unsafe path segment")));
    }

    #[tokio::test]
    async fn load_distinguishes_missing_from_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.torrent");
        let err = Metainfo::load(&missing).await.expect_err("missing file");
        assert_eq!(err.code(), "descriptor_not_found");

        let corrupt = dir.path().join("corrupt.torrent");
        std::fs::write(&corrupt, b"garbage").expect("write");
        let err = Metainfo::load(&corrupt).await.expect_err("corrupt file");
        assert!(matches!(
            err,
            TransferError::ParseError { path: Some(ref p), .. } if p == &corrupt
        ));
    }
}
