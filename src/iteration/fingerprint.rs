//! Content hashing and cache-validator comparison

use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};

use super::types::DocumentFingerprint;

/// SHA-256 of the content, lowercase hex
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// What cache validators say about a url relative to its prior fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorVerdict {
    Unchanged,
    Changed,
    /// Not enough validators on both sides to decide
    Unknown,
}

fn parse_http_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()))
        .ok()
}

/// Compare fresh validators against the prior fingerprint
///
/// Etags take precedence. A `Last-Modified` that is not newer than the
/// recorded one means unchanged; unparseable dates fall back to string
/// equality.
#[must_use]
pub fn compare_validators(
    prior: &DocumentFingerprint,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> ValidatorVerdict {
    if let (Some(current), Some(recorded)) = (etag, prior.etag.as_deref()) {
        return if current == recorded {
            ValidatorVerdict::Unchanged
        } else {
            ValidatorVerdict::Changed
        };
    }

    if let (Some(current), Some(recorded)) = (last_modified, prior.last_modified.as_deref()) {
        return match (parse_http_date(current), parse_http_date(recorded)) {
            (Some(current), Some(recorded)) if current <= recorded => ValidatorVerdict::Unchanged,
            (Some(_), Some(_)) => ValidatorVerdict::Changed,
            _ if current == recorded => ValidatorVerdict::Unchanged,
            _ => ValidatorVerdict::Changed,
        };
    }

    ValidatorVerdict::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn prior(etag: Option<&str>, last_modified: Option<&str>) -> DocumentFingerprint {
        DocumentFingerprint {
            url: "https://example.com/a".into(),
            content_hash: content_hash(b"a"),
            content_size: 1,
            etag: etag.map(str::to_string),
            last_modified: last_modified.map(str::to_string),
            iteration_id: "c_iter_1".into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn matching_etag_is_unchanged() {
        let fp = prior(Some("\"v1\""), None);
        assert_eq!(compare_validators(&fp, Some("\"v1\""), None), ValidatorVerdict::Unchanged);
        assert_eq!(compare_validators(&fp, Some("\"v2\""), None), ValidatorVerdict::Changed);
    }

    #[test]
    fn older_or_equal_last_modified_is_unchanged() {
        let fp = prior(None, Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(
            compare_validators(&fp, None, Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            ValidatorVerdict::Unchanged
        );
        assert_eq!(
            compare_validators(&fp, None, Some("Tue, 20 Oct 2015 07:28:00 GMT")),
            ValidatorVerdict::Unchanged
        );
        assert_eq!(
            compare_validators(&fp, None, Some("Thu, 22 Oct 2015 07:28:00 GMT")),
            ValidatorVerdict::Changed
        );
    }

    #[test]
    fn missing_validators_are_unknown() {
        let fp = prior(None, None);
        assert_eq!(compare_validators(&fp, Some("\"v1\""), None), ValidatorVerdict::Unknown);
    }
}
