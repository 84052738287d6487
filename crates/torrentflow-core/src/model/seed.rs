use std::collections::HashSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};
use tracing::debug;

use super::Metainfo;
use super::metainfo::{RawFile, RawInfo};
use crate::error::{TransferError, TransferResult};

const READ_CHUNK: usize = 64 * 1024;

/// Descriptor built from local files so they can be seeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedDescriptor {
    metainfo: Metainfo,
    sources: Vec<PathBuf>,
}

impl SeedDescriptor {
    /// Piece size used when none is configured.
    pub const DEFAULT_PIECE_LENGTH: u64 = 256 * 1024;

    /// Describe `paths` as one multi-file transfer named after the first path.
    ///
    /// Piece hashes are computed on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidInput`] when `paths` is empty, a path is
    /// not a readable regular file, two paths share a file name, or a file
    /// changes size while it is hashed.
    pub async fn build(
        paths: Vec<PathBuf>,
        piece_length: u64,
        trackers: Vec<String>,
    ) -> TransferResult<Self> {
        if paths.is_empty() {
            return Err(TransferError::invalid_input("paths", "no files provided"));
        }
        if piece_length == 0 {
            return Err(TransferError::invalid_input("piece_length", "must be positive"));
        }
        tokio::task::spawn_blocking(move || build_blocking(paths, piece_length, trackers))
            .await
            .map_err(|err| TransferError::engine("hash_pieces", None, err.into()))?
    }

    /// Descriptor handed to the engine.
    #[must_use]
    pub const fn metainfo(&self) -> &Metainfo {
        &self.metainfo
    }

    /// Local files backing each entry, in descriptor order.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn build_blocking(
    paths: Vec<PathBuf>,
    piece_length: u64,
    trackers: Vec<String>,
) -> TransferResult<SeedDescriptor> {
    let name = file_name(&paths[0])?;
    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let meta = std::fs::metadata(path).map_err(|err| unreadable(path, &err))?;
        if !meta.is_file() {
            return Err(TransferError::invalid_input(
                "paths",
                format!("{} is not a regular file", path.display()),
            ));
        }
        let base = file_name(path)?;
        if !seen.insert(base.clone()) {
            return Err(TransferError::invalid_input(
                "paths",
                format!("more than one file is named `{base}`"),
            ));
        }
        files.push(RawFile {
            length: meta.len(),
            path: vec![base],
        });
    }

    let pieces = hash_pieces(&paths, &files, piece_length)?;
    debug!(
        name = %name,
        files = files.len(),
        pieces = pieces.len() / 20,
        "seed descriptor hashed"
    );
    let raw = RawInfo {
        files: Some(files),
        length: None,
        name,
        piece_length,
        pieces: ByteBuf::from(pieces),
    };
    let info_bytes = serde_bencode::to_bytes(&raw)
        .map_err(|err| TransferError::parse(format!("info encoding failed: {err}")))?;
    let tiers = if trackers.is_empty() {
        Vec::new()
    } else {
        vec![trackers]
    };
    let metainfo = Metainfo::from_info_bytes(info_bytes, tiers)?;
    Ok(SeedDescriptor {
        metainfo,
        sources: paths,
    })
}

fn hash_pieces(paths: &[PathBuf], files: &[RawFile], piece_length: u64) -> TransferResult<Vec<u8>> {
    let piece_len = usize::try_from(piece_length)
        .map_err(|_| TransferError::invalid_input("piece_length", "exceeds address space"))?;
    let mut pieces = Vec::new();
    let mut piece = Vec::with_capacity(piece_len);
    let mut chunk = vec![0_u8; READ_CHUNK];

    for (path, entry) in paths.iter().zip(files) {
        let mut file = File::open(path).map_err(|err| unreadable(path, &err))?;
        let mut read_total = 0_u64;
        loop {
            let read = match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(unreadable(path, &err)),
            };
            read_total += read as u64;
            let mut rest = &chunk[..read];
            while !rest.is_empty() {
                let take = (piece_len - piece.len()).min(rest.len());
                piece.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                if piece.len() == piece_len {
                    pieces.extend_from_slice(&Sha1::digest(&piece));
                    piece.clear();
                }
            }
        }
        if read_total != entry.length {
            return Err(TransferError::invalid_input(
                "paths",
                format!("{} changed size while hashing", path.display()),
            ));
        }
    }
    if !piece.is_empty() {
        pieces.extend_from_slice(&Sha1::digest(&piece));
    }
    Ok(pieces)
}

fn file_name(path: &Path) -> TransferResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TransferError::invalid_input("paths", format!("{} has no file name", path.display()))
        })
}

fn unreadable(path: &Path, err: &std::io::Error) -> TransferError {
    TransferError::invalid_input("paths", format!("{} is unreadable: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrentflow_test_support::fixtures::{DescriptorFixture, FixtureFile, scratch_dir};

    #[tokio::test]
    async fn matches_an_independently_encoded_descriptor() {
        let dir = scratch_dir();
        let first = dir.path().join("notes.txt");
        let second = dir.path().join("photo.raw");
        std::fs::write(&first, vec![7_u8; 300_000]).expect("write");
        std::fs::write(&second, vec![8_u8; 10]).expect("write");

        let seed = SeedDescriptor::build(
            vec![first.clone(), second.clone()],
            SeedDescriptor::DEFAULT_PIECE_LENGTH,
            vec!["udp://tracker.openbittorrent.com:80/announce".into()],
        )
        .await
        .expect("seed builds");

        let fixture = DescriptorFixture::new("notes.txt", SeedDescriptor::DEFAULT_PIECE_LENGTH)
            .with_file(FixtureFile::new(&["notes.txt"], vec![7_u8; 300_000]))
            .with_file(FixtureFile::new(&["photo.raw"], vec![8_u8; 10]));
        assert_eq!(seed.metainfo().info_hash().as_bytes(), &fixture.info_hash());

        let metadata = seed.metainfo().metadata();
        assert_eq!(metadata.name, "notes.txt");
        assert_eq!(metadata.piece_length, 256 * 1024);
        assert_eq!(metadata.piece_count, 2);
        assert_eq!(seed.sources(), [first, second]);
        assert_eq!(
            seed.metainfo().tracker_tiers(),
            [vec!["udp://tracker.openbittorrent.com:80/announce".to_string()]]
        );
    }

    #[tokio::test]
    async fn rejects_empty_missing_and_duplicate_inputs() {
        let err = SeedDescriptor::build(Vec::new(), 1024, Vec::new())
            .await
            .expect_err("empty");
        assert_eq!(err.code(), "invalid_input");

        let dir = scratch_dir();
        let err = SeedDescriptor::build(vec![dir.path().join("absent")], 1024, Vec::new())
            .await
            .expect_err("missing");
        assert_eq!(err.code(), "invalid_input");

        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).expect("mkdir");
        let a = dir.path().join("same.bin");
        let b = nested.join("same.bin");
        std::fs::write(&a, b"a").expect("write");
        std::fs::write(&b, b"b").expect("write");
        let err = SeedDescriptor::build(vec![a, b], 1024, Vec::new())
            .await
            .expect_err("duplicate names");
        assert!(matches!(err, TransferError::InvalidInput { ref reason, .. } if reason.contains("more than one file")));

        let err = SeedDescriptor::build(vec![nested], 1024, Vec::new())
            .await
            .expect_err("directory");
        assert!(matches!(err, TransferError::InvalidInput { ref reason, .. } if reason.contains("not a regular file")));
    }
}
