//! Decoding scenarios for captured outbox inserts.

use cdc_replication::{DecodeError, Decoder, RelationSchema, TupleColumn};

const OUTBOX_RELATION: u32 = 16384;

fn outbox_relation() -> RelationSchema {
    RelationSchema::from_names(
        OUTBOX_RELATION,
        "outbox_events",
        ["id", "aggregate_type", "aggregate_id", "actor_id", "type", "payload"],
    )
}

fn text_tuple(values: &[&str]) -> Vec<TupleColumn> {
    values.iter().map(|v| TupleColumn::text(*v)).collect()
}

#[test]
fn test_order_created_row() {
    let mut decoder = Decoder::new();
    decoder.register_relation(outbox_relation());

    let bytes = decoder
        .decode_insert(
            OUTBOX_RELATION,
            &text_tuple(&["e1", "order", "o1", "u1", "Created", "{}"]),
        )
        .expect("decode should succeed");

    let actual: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let expected = serde_json::json!({
        "id": "e1",
        "aggregate_type": "order",
        "aggregate_id": "o1",
        "actor_id": "u1",
        "type": "Created",
        "payload": {}
    });
    assert_eq!(actual, expected);
}

#[test]
fn test_schema_must_precede_data() {
    let mut decoder = Decoder::new();
    let tuple = text_tuple(&["e1", "order", "o1", "u1", "Created", "{}"]);

    let err = decoder.decode_insert(OUTBOX_RELATION, &tuple).unwrap_err();
    assert!(matches!(err, DecodeError::UnknownRelation(OUTBOX_RELATION)));

    decoder.register_relation(outbox_relation());
    assert!(decoder.decode_insert(OUTBOX_RELATION, &tuple).is_ok());
}

#[test]
fn test_wider_tuple_than_schema_does_not_panic() {
    let mut decoder = Decoder::new();
    decoder.register_relation(RelationSchema::from_names(
        OUTBOX_RELATION,
        "outbox_events",
        ["id", "aggregate_type", "aggregate_id"],
    ));

    let row = decoder
        .decode_row(
            OUTBOX_RELATION,
            &text_tuple(&["e1", "order", "o1", "u1", "Created", "{}", "x", "y"]),
        )
        .unwrap();

    assert_eq!(row.id, "e1");
    assert_eq!(row.aggregate_id, "o1");
    assert_eq!(row.event_type, "");
    assert!(row.payload.is_none());
}

#[test]
fn test_payload_document_is_kept_verbatim() {
    let mut decoder = Decoder::new();
    decoder.register_relation(outbox_relation());
    let payload = r#"{"z":1,"a":{"nested":[1,2,3]},"amount":10.50}"#;

    let bytes = decoder
        .decode_insert(
            OUTBOX_RELATION,
            &text_tuple(&["e2", "order", "o1", "u1", "Paid", payload]),
        )
        .unwrap();

    let body = String::from_utf8(bytes).unwrap();
    assert!(body.ends_with(&format!(r#""payload":{}}}"#, payload)));
}
