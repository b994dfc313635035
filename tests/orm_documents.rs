mod common;

use common::{City, Country, CITY, COUNTRY, FIRST_ENTITY, PET, SECOND_ENTITY};
use pretty_assertions::assert_eq;
use serde_json::json;
use xtdb_client::orm::{Document, Entity, TxFunction};
use xtdb_client::XtdbError;

#[test]
fn proper_document_format() {
    let document = Document::entity(&FIRST_ENTITY, "first")
        .with_field(&FIRST_ENTITY, "name", "test")
        .unwrap();
    assert_eq!(
        document.clone().into_value(),
        json!({"xt/id": "first", "type": "FirstEntity", "FirstEntity/name": "test"})
    );
    assert_eq!(document.str_field(&FIRST_ENTITY, "name").unwrap(), "test");

    let second = Document::entity(&SECOND_ENTITY, "second")
        .with_field(&SECOND_ENTITY, "first_entity", document.id())
        .unwrap()
        .with_field(&SECOND_ENTITY, "age", 12)
        .unwrap();
    assert_eq!(
        second.clone().into_value(),
        json!({
            "xt/id": "second",
            "type": "SecondEntity",
            "SecondEntity/first_entity": "first",
            "SecondEntity/age": 12,
        })
    );
    assert_eq!(second.i64_field(&SECOND_ENTITY, "age").unwrap(), 12);
    assert_eq!(second.entity_alias(), Some("SecondEntity"));
}

#[test]
fn undeclared_fields_are_refused() {
    let err = Document::entity(&FIRST_ENTITY, "x")
        .with_field(&FIRST_ENTITY, "age", 1)
        .unwrap_err();
    assert_eq!(err.to_string(), "\"age\" is not a field of FirstEntity");
}

#[test]
fn entities_round_trip_through_documents() {
    let paris = City {
        id: "paris".to_string(),
        country: "france".to_string(),
        population: 2_100_000,
        name: "Paris".to_string(),
    };
    let document = paris.to_document();
    assert_eq!(document.get("City/country"), Some(&json!("france")));
    assert_eq!(City::from_document(&document).unwrap(), paris);

    let france = common::country("france", "France");
    assert_eq!(Country::from_document(&france.to_document()).unwrap(), france);
    assert_eq!(Country::entity_type(), &COUNTRY);
}

#[test]
fn decoding_reports_missing_and_mistyped_fields() {
    let document = Document::entity(&CITY, "x").with("City/name", 3);
    let err = City::from_document(&document).unwrap_err();
    assert!(matches!(err, XtdbError::InvalidDocument(_)));

    let err = document.str_field(&CITY, "name").unwrap_err();
    assert!(err.to_string().contains("City/name should be a string"));
}

#[test]
fn documents_need_a_string_id() {
    assert!(Document::try_from(json!({"xt/id": "a", "k": 1})).is_ok());
    assert!(matches!(
        Document::try_from(json!({"xt/id": 1})),
        Err(XtdbError::InvalidDocument(_))
    ));
    assert!(matches!(Document::try_from(json!([1, 2])), Err(XtdbError::InvalidDocument(_))));
}

#[test]
fn entity_type_descriptors() {
    assert_eq!(SECOND_ENTITY.relation("first_entity"), Some(&FIRST_ENTITY));
    assert!(SECOND_ENTITY.relation("age").is_none());
    assert_eq!(SECOND_ENTITY.relations().count(), 1);
    assert_eq!(SECOND_ENTITY.qualify("age"), "SecondEntity/age");

    let variants: Vec<&str> = PET.variants().iter().map(|variant| variant.alias()).collect();
    assert_eq!(variants, ["Cat", "Dog"]);
    assert_eq!(PET.to_string(), "Pet");
}

#[test]
fn transaction_function_documents() {
    let function = TxFunction::new("incr", "(fn [ctx] [])");
    assert_eq!(
        function.to_document().into_value(),
        json!({"xt/id": "incr", "xt/fn": "(fn [ctx] [])"})
    );
}
