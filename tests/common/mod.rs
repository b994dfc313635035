#![allow(dead_code)]

use xtdb_client::entity_type;
use xtdb_client::orm::{Document, Entity, EntityType, Field};
use xtdb_client::Result;

entity_type!(pub static FIRST_ENTITY: "FirstEntity" = [Field::scalar("name")]);
entity_type!(pub static SECOND_ENTITY: "SecondEntity" = [
    Field::scalar("age"),
    Field::relation("first_entity", &FIRST_ENTITY),
]);
entity_type!(pub static THIRD_ENTITY: "ThirdEntity" = [
    Field::relation("first_entity", &FIRST_ENTITY),
    Field::relation("second_entity", &SECOND_ENTITY),
]);

entity_type!(pub static COUNTRY: "Country" = [Field::scalar("name")]);
entity_type!(pub static CITY: "City" = [
    Field::relation("country", &COUNTRY),
    Field::scalar("population"),
    Field::scalar("name"),
]);
entity_type!(pub static USER: "User" = [
    Field::relation("city", &CITY),
    Field::relation("country", &COUNTRY),
    Field::scalar("name"),
]);

// an abstract type stored as one of its concrete variants
entity_type!(pub static CAT: "Cat" = [Field::scalar("name"), Field::relation("owner", &USER)]);
entity_type!(pub static DOG: "Dog" = [Field::scalar("name"), Field::relation("owner", &USER)]);
entity_type!(pub static PET: "Pet" = [
    Field::scalar("name"),
    Field::relation("owner", &USER),
], variants = [&CAT, &DOG]);

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub id: String,
    pub name: String,
}

impl Entity for Country {
    fn entity_type() -> &'static EntityType {
        &COUNTRY
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn to_document(&self) -> Document {
        Document::entity(&COUNTRY, self.id.clone()).with(COUNTRY.qualify("name"), self.name.clone())
    }
    fn from_document(document: &Document) -> Result<Self> {
        Ok(Self {
            id: document.id().to_string(),
            name: document.str_field(&COUNTRY, "name")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: String,
    pub country: String,
    pub population: i64,
    pub name: String,
}

impl Entity for City {
    fn entity_type() -> &'static EntityType {
        &CITY
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn to_document(&self) -> Document {
        Document::entity(&CITY, self.id.clone())
            .with(CITY.qualify("country"), self.country.clone())
            .with(CITY.qualify("population"), self.population)
            .with(CITY.qualify("name"), self.name.clone())
    }
    fn from_document(document: &Document) -> Result<Self> {
        Ok(Self {
            id: document.id().to_string(),
            country: document.str_field(&CITY, "country")?.to_string(),
            population: document.i64_field(&CITY, "population")?,
            name: document.str_field(&CITY, "name")?.to_string(),
        })
    }
}

pub fn country(id: &str, name: &str) -> Country {
    Country {
        id: id.to_string(),
        name: name.to_string(),
    }
}
