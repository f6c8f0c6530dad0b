//! Integration coverage for the event adapter (C1): parsing a full SQS-style
//! message body end to end, independent of the worker loop that calls it.

use bucketmirror::event::parse_envelope;
use bucketmirror::model::{EventKind, Receipt};

fn receipt(s: &str) -> Receipt {
    Receipt(s.to_string())
}

#[test]
fn s1_create_event_is_normalized() {
    let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"src-bucket"},"object":{"key":"a/b.txt","size":10,"eTag":"abc123"}}}]}"#;

    let events = parse_envelope(body, "src-bucket", "", receipt("r-1"), 1).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Create);
    assert_eq!(events[0].key, "a/b.txt");
    assert_eq!(events[0].size_hint, Some(10));
    assert_eq!(events[0].etag_hint.as_deref(), Some("abc123"));
}

#[test]
fn s4_any_object_removed_variant_is_a_delete() {
    for event_name in ["ObjectRemoved:Delete", "ObjectRemoved:DeleteMarkerCreated"] {
        let body = format!(
            r#"{{"Records":[{{"eventName":"{event_name}","s3":{{"bucket":{{"name":"src-bucket"}},"object":{{"key":"x"}}}}}}]}}"#
        );
        let events = parse_envelope(&body, "src-bucket", "", receipt("r"), 1).unwrap();
        assert_eq!(events.len(), 1, "{event_name} should normalize to exactly one event");
        assert_eq!(events[0].kind, EventKind::Delete);
    }
}

#[test]
fn one_message_fans_out_into_multiple_events_processed_independently() {
    let body = r#"{"Records":[
        {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"src-bucket"},"object":{"key":"keep/a","size":1}}},
        {"eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"src-bucket"},"object":{"key":"keep/b"}}},
        {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"other-bucket"},"object":{"key":"skip/c"}}}
    ]}"#;

    let err = parse_envelope(body, "src-bucket", "", receipt("r"), 1).unwrap_err();
    // A bucket mismatch on any record fails the whole message (§3): the
    // worker leaves it un-acked rather than partially applying it.
    assert!(matches!(err, bucketmirror::MirrorError::ConfigMismatch(_)));
}

#[test]
fn prefix_filter_skips_non_matching_keys_as_a_no_op() {
    let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"src-bucket"},"object":{"key":"other/file.txt","size":1}}}]}"#;

    let events = parse_envelope(body, "src-bucket", "mirrored/", receipt("r"), 1).unwrap();

    assert!(events.is_empty());
}

#[test]
fn malformed_body_is_rejected_for_redrive() {
    let err = parse_envelope("not json at all", "src-bucket", "", receipt("r"), 1).unwrap_err();
    assert!(matches!(err, bucketmirror::MirrorError::MalformedEvent(_)));
}
