//! Page assembly driven by hand-fed rows, as an adapter would supply them.

use serde_json::json;

use pager_core::{
    keyset_bound, paginate, paginate_with, Cursor, OrderKey, OrderSpec, PageDirection,
    PageOptions, PageResult, Value,
};

fn name_asc_id_desc() -> OrderSpec {
    OrderSpec(vec![OrderKey::asc("name"), OrderKey::desc("id")])
}

#[test]
fn two_page_walk_over_three_products() {
    let order = name_asc_id_desc();

    // First page: adapter fetched size + 1 rows.
    let fetched = vec![
        json!({"name": "Product", "id": 123}),
        json!({"name": "Product", "id": 100}),
        json!({"name": "Widget", "id": 5}),
    ];
    let first = paginate(fetched, &order, &PageOptions::new(2)).expect("first page");
    assert_eq!(
        first.items,
        vec![json!({"name": "Product", "id": 123}), json!({"name": "Product", "id": 100})]
    );
    assert!(first.has_next);
    assert!(!first.has_prev);
    assert!(first.prev_cursor.is_none());

    let next = Cursor::decode(first.next_cursor.as_deref().expect("next cursor")).expect("decode");
    assert_eq!(next.values["name"], Value::from("Product"));
    assert_eq!(next.values["id"], Value::Int(100));

    // The bound the adapter would apply for the second page admits only Widget.
    let bound = keyset_bound(&order, &next.values, PageDirection::Forward).expect("bound");
    assert!(bound.admits(&json!({"name": "Widget", "id": 5})));
    assert!(!bound.admits(&json!({"name": "Product", "id": 123})));

    let second = paginate(
        vec![json!({"name": "Widget", "id": 5})],
        &order,
        &PageOptions::from_cursor(2, next),
    )
    .expect("second page");
    assert_eq!(second.items, vec![json!({"name": "Widget", "id": 5})]);
    assert!(!second.has_next);
    assert!(second.has_prev);
    assert!(second.next_cursor.is_none());
    assert!(second.prev_cursor.is_some());
}

#[test]
fn empty_result_without_cursor() {
    let page = paginate(Vec::<serde_json::Value>::new(), &name_asc_id_desc(), &PageOptions::new(10))
        .expect("page");
    assert_eq!(page, PageResult::empty());
    assert_eq!(page.total_size, None);
}

#[test]
fn empty_result_after_cursor_has_no_navigation() {
    let order = name_asc_id_desc();
    let cursor = Cursor::new(
        order.clone(),
        [("name".to_string(), Value::from("Zed")), ("id".to_string(), Value::Int(1))].into(),
    );
    let page = paginate(
        Vec::<serde_json::Value>::new(),
        &order,
        &PageOptions::new(10).with_cursor(cursor),
    )
    .expect("page");
    assert!(!page.has_next);
    assert!(!page.has_prev);
    assert!(page.next_cursor.is_none() && page.prev_cursor.is_none());
}

#[derive(Debug, Clone, PartialEq)]
struct Product {
    id: i64,
    likes: i64,
}

#[test]
fn custom_rows_with_key_extractor() {
    let order = OrderSpec::from_signed_tokens("-likes,+id").expect("order");
    let rows = vec![
        Product { id: 1, likes: 50 },
        Product { id: 4, likes: 50 },
        Product { id: 2, likes: 10 },
    ];
    let key_of = |p: &Product, field: &str| match field {
        "id" => Some(Value::Int(p.id)),
        "likes" => Some(Value::Int(p.likes)),
        _ => None,
    };

    let page = paginate_with(rows, &order, &PageOptions::new(2), key_of).expect("page");
    assert_eq!(page.items.len(), 2);
    let next = Cursor::decode(page.next_cursor.as_deref().expect("next")).expect("decode");
    assert_eq!(next.values["likes"], Value::Int(50));
    assert_eq!(next.values["id"], Value::Int(4));

    let dto = page.map_items(|p| p.id);
    assert_eq!(dto.items, vec![1, 4]);
    assert!(dto.has_next);
}

#[test]
fn backward_first_request_pages_from_the_end() {
    let order = OrderSpec::from_signed_tokens("+id").expect("order");
    // Fetched in reversed order (id desc), limit size + 1.
    let fetched = vec![json!({"id": 9}), json!({"id": 8}), json!({"id": 7})];
    let options = PageOptions::new(2).with_direction(PageDirection::Backward);
    let page = paginate(fetched, &order, &options).expect("page");

    assert_eq!(page.items, vec![json!({"id": 8}), json!({"id": 9})]);
    assert!(page.has_prev);
    assert!(!page.has_next);
    let prev = Cursor::decode(page.prev_cursor.as_deref().expect("prev")).expect("decode");
    assert_eq!(prev.direction, PageDirection::Backward);
    assert_eq!(prev.values["id"], Value::Int(8));
}
