//! Event source adapter (C1): turns a raw queue-message body into zero or
//! more normalized [`SyncEvent`]s.

use std::time::Instant;

use serde::Deserialize;

use crate::error::{MirrorError, Result};
use crate::model::{EventKind, Receipt, SyncEvent};

/// Bit-exact shape of the envelope this core must parse (§6).
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Records")]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "eventName")]
    event_name: String,
    s3: S3Detail,
}

#[derive(Debug, Deserialize)]
struct S3Detail {
    bucket: BucketDetail,
    object: ObjectDetail,
}

#[derive(Debug, Deserialize)]
struct BucketDetail {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectDetail {
    key: String,
    size: Option<u64>,
    #[serde(rename = "eTag")]
    e_tag: Option<String>,
}

/// Parses one queue-message body into its constituent [`SyncEvent`]s.
///
/// `source_bucket` is validated against every record's `bucket.name`;
/// any mismatch fails the whole message with [`MirrorError::ConfigMismatch`]
/// rather than silently dropping one record, since a mismatch indicates
/// the queue is wired to the wrong bucket.
///
/// `prefix_filter`, when non-empty, drops records whose decoded key does
/// not start with it — treated identically to an unrecognized
/// `eventName` prefix: a silent skip, not an error.
pub fn parse_envelope(
    body: &str,
    source_bucket: &str,
    prefix_filter: &str,
    receipt: Receipt,
    attempts: u32,
) -> Result<Vec<SyncEvent>> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| MirrorError::MalformedEvent(format!("invalid envelope JSON: {e}")))?;

    let received_at = Instant::now();
    let mut events = Vec::with_capacity(envelope.records.len());

    for record in envelope.records {
        let Some(kind) = classify(&record.event_name) else {
            continue;
        };

        if record.s3.bucket.name != source_bucket {
            return Err(MirrorError::ConfigMismatch(record.s3.bucket.name));
        }

        let key = decode_key(&record.s3.object.key);
        if !prefix_filter.is_empty() && !key.starts_with(prefix_filter) {
            continue;
        }

        events.push(SyncEvent {
            kind,
            key,
            size_hint: record.s3.object.size,
            etag_hint: record.s3.object.e_tag,
            received_at,
            receipt: receipt.clone(),
            attempts,
        });
    }

    Ok(events)
}

fn classify(event_name: &str) -> Option<EventKind> {
    if event_name.starts_with("ObjectCreated") {
        Some(EventKind::Create)
    } else if event_name.starts_with("ObjectRemoved") {
        Some(EventKind::Delete)
    } else {
        None
    }
}

/// Maps `+` to space, then percent-decodes, per source convention (the
/// event envelope encodes keys as `application/x-www-form-urlencoded`
/// would, where a literal space becomes `+`). The `+`-to-space swap must
/// happen *before* percent-decoding: a literal `+` the source intended is
/// itself percent-encoded as `%2B`, so decoding first would let this
/// step's later `+`-to-space pass corrupt it into a space.
fn decode_key(raw: &str) -> String {
    let plus_as_space = raw.replace('+', " ");
    urlencoding::decode(&plus_as_space)
        .map(|cow| cow.into_owned())
        .unwrap_or(plus_as_space)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> Receipt {
        Receipt("r-1".to_string())
    }

    #[test]
    fn create_event_parsed() {
        let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"a/b.txt","size":10}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Create);
        assert_eq!(events[0].key, "a/b.txt");
        assert_eq!(events[0].size_hint, Some(10));
    }

    #[test]
    fn delete_event_parsed() {
        let body = r#"{"Records":[{"eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"SRC"},"object":{"key":"x"}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Delete);
        assert_eq!(events[0].key, "x");
    }

    #[test]
    fn delete_marker_treated_as_delete() {
        // Open question resolution (§9): any ObjectRemoved:* is a target delete,
        // stricter than versioned-source semantics but unambiguous.
        let body = r#"{"Records":[{"eventName":"ObjectRemoved:DeleteMarkerCreated","s3":{"bucket":{"name":"SRC"},"object":{"key":"x"}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Delete);
    }

    #[test]
    fn unrecognized_prefix_is_skipped_not_error() {
        let body = r#"{"Records":[{"eventName":"ReducedRedundancyLostObject","s3":{"bucket":{"name":"SRC"},"object":{"key":"x"}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn bucket_mismatch_fails() {
        let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"OTHER"},"object":{"key":"x"}}}]}"#;
        let err = parse_envelope(body, "SRC", "", receipt(), 1).unwrap_err();
        assert!(matches!(err, MirrorError::ConfigMismatch(b) if b == "OTHER"));
    }

    #[test]
    fn malformed_body_fails() {
        let err = parse_envelope("not json", "SRC", "", receipt(), 1).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedEvent(_)));
    }

    #[test]
    fn key_is_url_decoded_plus_as_space() {
        let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"a+b%20c.txt"}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events[0].key, "a b c.txt");
    }

    #[test]
    fn percent_encoded_plus_survives_as_a_literal_plus() {
        // A raw `+` means space, but a source-intended literal `+` is itself
        // percent-encoded as `%2B` and must not be corrupted into a space by
        // the `+`-to-space step (order matters: space-swap before decode).
        let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"a%2Bb.txt"}}}]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events[0].key, "a+b.txt");
    }

    #[test]
    fn prefix_filter_skips_non_matching_keys() {
        let body = r#"{"Records":[
            {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"logs/a.txt"}}},
            {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"other/b.txt"}}}
        ]}"#;
        let events = parse_envelope(body, "SRC", "logs/", receipt(), 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "logs/a.txt");
    }

    #[test]
    fn multiple_records_fan_out() {
        let body = r#"{"Records":[
            {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"a"}}},
            {"eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"SRC"},"object":{"key":"b"}}}
        ]}"#;
        let events = parse_envelope(body, "SRC", "", receipt(), 1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Create);
        assert_eq!(events[1].kind, EventKind::Delete);
    }
}
