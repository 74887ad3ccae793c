//! Benchmark utilities.

#![warn(missing_docs)]

use bicycle_codec::Record;
use bicycle_core::{Engine, FieldType, IndexDef, IndexField, ModelDef};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Name of the benchmark model.
pub const PEOPLE: &str = "Person";

/// `Person { id, email, country, age?, bio? }` with a unique email index
/// and a `(country, age desc)` index.
pub fn people_model() -> ModelDef {
    ModelDef::new(PEOPLE)
        .field("id", FieldType::Integer)
        .field("email", FieldType::Text)
        .field("country", FieldType::Text)
        .optional_field("age", FieldType::Integer)
        .optional_field("bio", FieldType::Text)
        .primary_key(["id"])
        .index(IndexDef::new("by_email", ["email"]).unique())
        .index(IndexDef::new(
            "by_country_age",
            [IndexField::asc("country"), IndexField::desc("age")],
        ))
}

/// Countries drawn by [`person`].
pub const COUNTRIES: [&str; 8] = ["AU", "BR", "CA", "DE", "IN", "JP", "NZ", "US"];

/// Random alphanumeric text of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A person with id `id`, a random country and age, and a bio of
/// `bio_len` characters.
pub fn person(id: i64, bio_len: usize) -> Record {
    let mut rng = rand::thread_rng();
    Record::new()
        .with("id", id)
        .with("email", format!("person{id}@example.com"))
        .with("country", COUNTRIES[rng.gen_range(0..COUNTRIES.len())])
        .with("age", rng.gen_range(0..100i64))
        .with("bio", random_text(bio_len))
}

/// People with ids `first..first + count`.
pub fn people(first: i64, count: usize, bio_len: usize) -> Vec<Record> {
    (first..first + count as i64)
        .map(|id| person(id, bio_len))
        .collect()
}

/// An in-memory engine holding `count` people.
pub fn populated_engine(count: usize) -> Engine {
    let engine = Engine::open_in_memory().expect("failed to open engine");
    engine
        .register(people_model())
        .expect("failed to register model");
    for chunk in people(0, count, 64).chunks(1000) {
        engine
            .batch_put(PEOPLE, chunk.to_vec())
            .expect("failed to populate");
    }
    engine
}
