mod common;

use common::{CAT, CITY, COUNTRY, FIRST_ENTITY, PET, SECOND_ENTITY, USER};
use pretty_assertions::assert_eq;
use xtdb_client::datalog::{Combine, Where, WherePredicate};
use xtdb_client::keys::{In, OrderBy};
use xtdb_client::query::{FieldValue, Query, Var};
use xtdb_client::XtdbError;

#[test]
fn basic_field_where_clause() {
    let query = Query::new(&FIRST_ENTITY).where_field(&FIRST_ENTITY, "name", "test").unwrap();
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :FirstEntity/name \"test\" ]
    [ FirstEntity :type \"FirstEntity\" ]]}}"
    );

    let query = query.limit(4);
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :FirstEntity/name \"test\" ]
    [ FirstEntity :type \"FirstEntity\" ]] :limit 4}}"
    );

    let query = query.offset(0);
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :FirstEntity/name \"test\" ]
    [ FirstEntity :type \"FirstEntity\" ]] :limit 4 :offset 0}}"
    );

    let query = query.timeout(40);
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :FirstEntity/name \"test\" ]
    [ FirstEntity :type \"FirstEntity\" ]] :limit 4 :offset 0 :timeout 40}}"
    );
}

#[test]
fn reference_field_where_clause() {
    let query = Query::new(&FIRST_ENTITY)
        .where_field(&SECOND_ENTITY, "first_entity", &FIRST_ENTITY)
        .unwrap();
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :type \"FirstEntity\" ]
    [ SecondEntity :SecondEntity/first_entity FirstEntity ]]}}"
    );
}

#[test]
fn remove_duplicates() {
    let query = Query::new(&FIRST_ENTITY)
        .where_field(&SECOND_ENTITY, "first_entity", &FIRST_ENTITY)
        .unwrap();
    let twice = query
        .clone()
        .where_field(&SECOND_ENTITY, "first_entity", &FIRST_ENTITY)
        .unwrap();
    assert_eq!(query, twice);
}

#[test]
fn invalid_field_names() {
    let err = Query::new(&FIRST_ENTITY)
        .where_field(&FIRST_ENTITY, "wrong", &FIRST_ENTITY)
        .unwrap_err();
    assert_eq!(err.to_string(), "\"wrong\" is not a field of FirstEntity");

    let err = Query::new(&FIRST_ENTITY).where_field(&FIRST_ENTITY, "abc", "def").unwrap_err();
    assert!(matches!(err, XtdbError::InvalidField(_)));
    assert_eq!(err.to_string(), "\"abc\" is not a field of FirstEntity");
}

#[test]
fn invalid_field_types() {
    let err = Query::new(&FIRST_ENTITY).where_field(&SECOND_ENTITY, "test", 1).unwrap_err();
    assert_eq!(err.to_string(), "\"test\" is not a field of SecondEntity");

    let err = Query::new(&FIRST_ENTITY)
        .where_field(&FIRST_ENTITY, "name", &FIRST_ENTITY)
        .unwrap_err();
    assert_eq!(err.to_string(), "\"name\" is not a relation of FirstEntity");
}

#[test]
fn escaping_quotes() {
    let query = Query::new(&FIRST_ENTITY)
        .where_field(&SECOND_ENTITY, "first_entity", &FIRST_ENTITY)
        .unwrap()
        .where_field(&FIRST_ENTITY, "name", "test \" name")
        .unwrap();
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :FirstEntity/name \"test \\\" name\" ]
    [ FirstEntity :type \"FirstEntity\" ]
    [ SecondEntity :SecondEntity/first_entity FirstEntity ]]}}"
    );
}

#[test]
fn allow_string_for_foreign_keys() {
    let query = Query::new(&FIRST_ENTITY)
        .where_field(&SECOND_ENTITY, "first_entity", "FirstEntity|internet")
        .unwrap();
    assert_eq!(
        query.format(),
        "{:query {:find [(pull FirstEntity [*])] :where [
    [ FirstEntity :type \"FirstEntity\" ]
    [ SecondEntity :SecondEntity/first_entity \"FirstEntity|internet\" ]]}}"
    );
}

#[test]
fn country_city_user_scenario() {
    let query = Query::new(&COUNTRY)
        .where_field(&CITY, "country", &COUNTRY)
        .unwrap()
        .where_(&USER, [("city", FieldValue::from(&CITY)), ("name", "bA".into())])
        .unwrap();
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull Country [*])] :where [ \
         [ City :City/country Country ] \
         [ Country :type \"Country\" ] \
         [ User :User/city City ] \
         [ User :User/name \"bA\" ]]}}"
    );
}

#[test]
fn literal_values() {
    let query = Query::new(&CITY)
        .where_(
            &CITY,
            [
                ("population", FieldValue::from(2_100_000)),
                ("name", FieldValue::from(None::<&str>)),
            ],
        )
        .unwrap();
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull City [*])] :where [ \
         [ City :City/name nil ] \
         [ City :City/population 2100000 ] \
         [ City :type \"City\" ]]}}"
    );

    let query = Query::new(&CITY).where_field(&CITY, "population", 1.5).unwrap();
    assert!(query.to_string().contains("[ City :City/population 1.5 ]"));

    let query = Query::new(&CITY).where_field(&CITY, "name", Var::new("name")).unwrap();
    assert!(query.to_string().contains("[ City :City/name ?name ]"));
}

#[test]
fn non_finite_numbers_are_refused() {
    for (value, shown) in [(f64::NAN, "NaN"), (f64::INFINITY, "inf"), (f64::NEG_INFINITY, "-inf")] {
        match Query::new(&CITY).where_field(&CITY, "population", value) {
            Err(XtdbError::InvalidField(message)) => assert_eq!(
                message,
                format!("\"population\" cannot hold the non-finite value {shown}")
            ),
            other => panic!("expected an invalid field, got {other:?}"),
        }
    }
}

#[test]
fn variants_expand_to_disjunctions() {
    let query = Query::new(&PET).where_field(&PET, "owner", &USER).unwrap();
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull Pet [*])] :where [ \
         (or [ Pet :Cat/owner User ] [ Pet :Dog/owner User ]) \
         (or [ Pet :type \"Cat\" ] [ Pet :type \"Dog\" ])]}}"
    );

    let query = Query::new(&CAT);
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull Cat [*])] :where [[ Cat :type \"Cat\" ]]}}"
    );
}

#[test]
fn aggregates_replace_the_pull() {
    let query = Query::new(&CITY)
        .where_field(&CITY, "population", Var::new("population"))
        .unwrap()
        .sum(&Var::new("population"));
    assert!(!query.preserved_return_type());
    assert_eq!(
        query.to_string(),
        "{:query {:find [(sum ?population)] :where [ \
         [ City :City/population ?population ] \
         [ City :type \"City\" ]]}}"
    );

    let query = Query::new(&CITY).count(CITY.alias()).sample(&Var::new("name"), 3);
    assert!(query.to_string().starts_with("{:query {:find [(count City) (sample 3 ?name)] :where"));
    assert!(Query::new(&CITY).preserved_return_type());
}

#[test]
fn arbitrary_where_clauses() {
    let adults = WherePredicate::new(">", ["?population", "1000"]);
    let query = Query::new(&CITY)
        .where_field(&CITY, "population", Var::new("population"))
        .unwrap()
        .where_clause(adults)
        .unwrap()
        .where_clause(Where::new("City", "City/name", "\"Paris\"").negate().unwrap())
        .unwrap();
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull City [*])] :where [ \
         (not [ City :City/name \"Paris\" ]) \
         [ (> ?population 1000) ] \
         [ City :City/population ?population ] \
         [ City :type \"City\" ]]}}"
    );

    let err = Query::new(&CITY)
        .where_clause(xtdb_client::datalog::Find::new("?x"))
        .unwrap_err();
    assert!(matches!(err, XtdbError::IncompatibleSection { .. }));
}

#[test]
fn keys_and_inputs() {
    let order = OrderBy::new([("?name", "asc"), ("?population", "desc")]).unwrap();
    let query = Query::new(&CITY)
        .where_field(&CITY, "name", Var::new("name"))
        .unwrap()
        .in_(In::scalar("?name", "Paris").unwrap())
        .order_by(order)
        .limit(10);
    assert_eq!(
        query.to_string(),
        "{:query {:find [(pull City [*])] :where [ \
         [ City :City/name ?name ] \
         [ City :type \"City\" ]] \
         :in [?name] :order-by [[?name :asc] [?population :desc]] :limit 10} \
         :in-args [\"Paris\"]}"
    );

    let err = OrderBy::new([("?name", "up")]).unwrap_err();
    assert!(matches!(err, XtdbError::InvalidSortDirection(_)));
}

#[test]
fn queries_are_values() {
    let base = Query::new(&CITY).limit(1);
    let other = base.clone().offset(2);
    assert!(!base.to_string().contains(":offset"));
    assert!(other.to_string().contains(":limit 1 :offset 2"));
}
