//! The cursor payload format is a compatibility contract with deployed tokens.

use std::collections::BTreeMap;

use pager_core::{
    base64_url, decode_cursor, encode_cursor, validate_cursor_ordering, Cursor, CursorError,
    OrderKey, OrderSpec, PageDirection, SortDir, Value,
};

const PADDED: &str =
    "eyJvIjpbIituYW1lIiwiLWlkIl0sInYiOnsibmFtZSI6IlByb2R1Y3QiLCJpZCI6MTIzfX0=";

fn name_asc_id_desc() -> OrderSpec {
    OrderSpec(vec![OrderKey::asc("name"), OrderKey::desc("id")])
}

fn product_123() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("name".to_string(), Value::from("Product")),
        ("id".to_string(), Value::Int(123)),
    ])
}

#[test]
fn decodes_known_token() {
    let (ordering, values) = decode_cursor(PADDED).expect("decode");
    assert_eq!(ordering, name_asc_id_desc());
    assert_eq!(values, product_123());
}

#[test]
fn encodes_known_token_without_padding() {
    let token = encode_cursor(&name_asc_id_desc(), &product_123()).expect("encode");
    assert_eq!(token, PADDED.trim_end_matches('='));
}

#[test]
fn decode_accepts_missing_padding() {
    let unpadded = PADDED.trim_end_matches('=');
    assert_eq!(decode_cursor(unpadded), decode_cursor(PADDED));
}

#[test]
fn typed_values_round_trip_through_kinds() {
    use pager_core::FieldKind;
    use std::collections::HashMap;

    let ordering = OrderSpec(vec![
        OrderKey::desc("created_at"),
        OrderKey::asc("price"),
        OrderKey::asc("id"),
    ]);
    let created: chrono::DateTime<chrono::Utc> = "2024-05-01T12:30:00.250Z".parse().unwrap();
    let id: uuid::Uuid = "123e4567-e89b-12d3-a456-426614174000".parse().unwrap();
    let values = BTreeMap::from([
        ("created_at".to_string(), Value::DateTime(created)),
        ("price".to_string(), Value::Decimal("19.990".parse().unwrap())),
        ("id".to_string(), Value::Uuid(id)),
    ]);
    let kinds = HashMap::from([
        ("created_at".to_string(), FieldKind::DateTimeUtc),
        ("price".to_string(), FieldKind::Decimal),
        ("id".to_string(), FieldKind::Uuid),
    ]);

    let token = encode_cursor(&ordering, &values).expect("encode");
    let cursor = Cursor::decode(&token)
        .expect("decode")
        .coerce_values(&kinds)
        .expect("coerce");

    assert_eq!(cursor.values["created_at"], Value::DateTime(created));
    assert_eq!(cursor.values["id"], Value::Uuid(id));
    assert_eq!(
        cursor.values["price"].compare(&Value::Decimal("19.99".parse().unwrap())),
        Some(std::cmp::Ordering::Equal)
    );
}

#[test]
fn legacy_payload_with_explicit_direction() {
    let raw = br#"{"o":["+name","-id"],"v":{"name":"Banana","id":2},"d":"prev"}"#;
    let cursor = Cursor::decode(&base64_url::encode(raw)).expect("decode");
    assert_eq!(cursor.direction, PageDirection::Backward);
    assert_eq!(cursor.filter_hash, None);
}

#[test]
fn every_ordering_difference_is_detected() {
    let minted = name_asc_id_desc();
    let variants = [
        OrderSpec(vec![OrderKey::asc("name")]),
        OrderSpec(vec![OrderKey::asc("name"), OrderKey::asc("id")]),
        OrderSpec(vec![OrderKey::desc("id"), OrderKey::asc("name")]),
        OrderSpec(vec![
            OrderKey::asc("name"),
            OrderKey::desc("id"),
            OrderKey::new("likes", SortDir::Asc),
        ]),
        OrderSpec(vec![OrderKey::asc("title"), OrderKey::desc("id")]),
    ];
    for effective in &variants {
        assert!(matches!(
            validate_cursor_ordering(&minted, effective),
            Err(CursorError::OrderMismatch { .. })
        ));
    }
    assert!(validate_cursor_ordering(&minted, &name_asc_id_desc()).is_ok());
}
