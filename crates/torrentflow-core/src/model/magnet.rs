use std::fmt::{self, Display, Formatter};

use torrentflow_events::InfoHash;
use url::Url;

use crate::error::{TransferError, TransferResult};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parsed `magnet:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    info_hash: InfoHash,
    display_name: Option<String>,
    trackers: Vec<String>,
    uri: String,
}

impl MagnetLink {
    /// Parse and validate a magnet URI.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidInput`] when the scheme is wrong, the
    /// exact topic is missing, or the hash cannot be decoded.
    pub fn parse(uri: &str) -> TransferResult<Self> {
        let trimmed = uri.trim();
        let url = Url::parse(trimmed)
            .map_err(|err| TransferError::invalid_input("magnet", err.to_string()))?;
        if url.scheme() != "magnet" {
            return Err(TransferError::invalid_input(
                "magnet",
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers: Vec<String> = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    let Some(encoded) = strip_prefix_ignore_case(&value, BTIH_PREFIX) else {
                        continue;
                    };
                    let parsed = InfoHash::parse(encoded)
                        .map_err(|err| TransferError::invalid_input("magnet", err.to_string()))?;
                    info_hash.get_or_insert(parsed);
                }
                "dn" if !value.trim().is_empty() => {
                    display_name = Some(value.trim().to_string());
                }
                "tr" if !value.trim().is_empty() => {
                    let tracker = value.trim().to_string();
                    if !trackers.contains(&tracker) {
                        trackers.push(tracker);
                    }
                }
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            TransferError::invalid_input("magnet", "missing `xt=urn:btih:` exact topic")
        })?;
        Ok(Self {
            info_hash,
            display_name,
            trackers,
            uri: trimmed.to_string(),
        })
    }

    /// Content identifier carried by the link.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Provisional name from the `dn` parameter.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Tracker URLs from `tr` parameters, de-duplicated in order.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    /// The URI as supplied (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl Display for MagnetLink {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.uri)
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn parses_hash_name_and_trackers() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HEX}&dn=Ubuntu+24.04&tr=udp%3A%2F%2Ftracker.example%3A80&tr=udp%3A%2F%2Ftracker.example%3A80&tr=http%3A%2F%2Fother%2Fannounce"
        );
        let magnet = MagnetLink::parse(&uri).expect("valid magnet");
        assert_eq!(magnet.info_hash().to_string(), HEX);
        assert_eq!(magnet.display_name(), Some("Ubuntu 24.04"));
        assert_eq!(
            magnet.trackers(),
            ["udp://tracker.example:80", "http://other/announce"]
        );
    }

    #[test]
    fn accepts_base32_topics() {
        let uri = "magnet:?xt=urn:btih:YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK";
        let magnet = MagnetLink::parse(uri).expect("valid base32 magnet");
        assert_eq!(magnet.info_hash().to_string(), HEX);
        assert_eq!(magnet.display_name(), None);
    }

    #[test]
    fn rejects_malformed_links() {
        for uri in [
            "",
            "not a uri",
            "https://example.com/?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a",
            "magnet:?dn=no-topic",
            "magnet:?xt=urn:btih:1234",
            "magnet:?xt=urn:sha1:c12fe1c06bba254a9dc9f519b335aa7c1367a88a",
        ] {
            let err = MagnetLink::parse(uri).expect_err(uri);
            assert_eq!(err.code(), "invalid_input", "{uri}");
        }
    }
}
