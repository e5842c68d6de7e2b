use pager_core::{
    compile_filter, AllowList, BinaryOperator, Error, FieldKind, Function, LogicalOperator,
    Predicate, Value, ValidationError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column {
    Name,
    Price,
    Category,
    CreatedAt,
}

fn products() -> AllowList<Column> {
    AllowList::new()
        .with("name", Column::Name, FieldKind::String)
        .with("price", Column::Price, FieldKind::Decimal)
        .with("category", Column::Category, FieldKind::String)
        .with("created_at", Column::CreatedAt, FieldKind::DateTimeUtc)
}

#[test]
fn compiles_a_realistic_filter() {
    let predicate = compile_filter(
        "price >= 20000 && category in ['electronics', 'audio'] && name.contains('phone')",
        &products(),
    )
    .expect("compile");

    let Predicate::Logical(LogicalOperator::And, parts) = predicate else {
        panic!("expected a conjunction");
    };
    assert_eq!(parts.len(), 3);

    let Predicate::Binary(BinaryOperator::Ge, field, literal) = &parts[0] else {
        panic!("expected price >= ...");
    };
    assert!(matches!(**field, Predicate::Field(ref f) if f.handle == Column::Price));
    assert!(matches!(**literal, Predicate::Literal(Value::Decimal(_))));

    assert!(matches!(&parts[1], Predicate::Binary(BinaryOperator::In, _, list)
        if matches!(**list, Predicate::List(ref v) if v.len() == 2)));
    assert!(matches!(&parts[2], Predicate::Call(Function::Contains, args) if args.len() == 2));
}

#[test]
fn unknown_field_in_any_shape_is_rejected() {
    let shapes = [
        "owner == 'x'",
        "owner.name == 'x'",
        "!(owner == 'x')",
        "name == 'a' || owner in ['x']",
        "startsWith(owner, 'x')",
        "created_at > '2024-01-01T00:00:00Z' && owner != null",
    ];
    for text in shapes {
        match compile_filter(text, &products()) {
            Err(Error::Validation(ValidationError::UnknownField { .. })) => {}
            other => panic!("{text}: expected unknown field, got {other:?}"),
        }
    }
}

#[test]
fn malformed_text_is_a_parse_error_with_position() {
    match compile_filter("price >= 1 && (name == 'x'", &products()) {
        Err(Error::Parse(e)) => assert_eq!(e.position(), Some(14)),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn declared_kinds_drive_type_checks() {
    assert!(matches!(
        compile_filter("created_at < 42", &products()),
        Err(Error::Validation(ValidationError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        compile_filter("name < 'm'", &products()),
        Ok(Predicate::Binary(BinaryOperator::Lt, _, _))
    ));
}
