//! Animal record model
//!
//! Records are schema-flexible. An [`AnimalRecord`] wraps the document exactly
//! as it is stored; the three fields the store indexes and aggregates on get
//! typed accessors, everything else is reached through [`AnimalRecord::get`].

use crate::validation::validate_field_names;
use crate::Result;
use bson::{Bson, Document as BsonDocument};
use shelter_common::ShelterError;

pub const FIELD_BREED: &str = "breed";
pub const FIELD_ANIMAL_TYPE: &str = "animal_type";
pub const FIELD_AGE_WEEKS: &str = "age_upon_outcome_in_weeks";

/// Identifier field owned by the store
pub const FIELD_ID: &str = "_id";

/// One document from the animals collection
///
/// Field order and value types are kept as given, so a record written with
/// `create` is stored unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimalRecord {
    document: BsonDocument,
}

impl AnimalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_breed(self, breed: impl Into<String>) -> Self {
        self.with_field(FIELD_BREED, breed.into())
    }

    pub fn with_animal_type(self, animal_type: impl Into<String>) -> Self {
        self.with_field(FIELD_ANIMAL_TYPE, animal_type.into())
    }

    pub fn with_age_in_weeks(self, weeks: f64) -> Self {
        self.with_field(FIELD_AGE_WEEKS, weeks)
    }

    /// Set an arbitrary field; an existing field keeps its position
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.document.insert(key.into(), value.into());
        self
    }

    pub fn breed(&self) -> Option<&str> {
        self.document.get_str(FIELD_BREED).ok()
    }

    pub fn animal_type(&self) -> Option<&str> {
        self.document.get_str(FIELD_ANIMAL_TYPE).ok()
    }

    /// Age at outcome, whichever numeric type it was stored as
    pub fn age_in_weeks(&self) -> Option<f64> {
        match self.document.get(FIELD_AGE_WEEKS)? {
            Bson::Double(n) => Some(*n),
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.document.get(key)
    }

    pub fn document(&self) -> &BsonDocument {
        &self.document
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Check the record before it is written
    ///
    /// # Errors
    /// - the record is empty
    /// - `breed` or `animal_type` is present but not a string
    /// - the age is present but not a finite number
    /// - a field name is empty, starts with `$` or contains a null byte
    pub fn validate_for_insert(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ShelterError::Validation(
                "Empty record cannot be inserted".to_string(),
            ));
        }

        for key in [FIELD_BREED, FIELD_ANIMAL_TYPE] {
            match self.document.get(key) {
                None | Some(Bson::String(_)) => {}
                Some(other) => return Err(unexpected_type(key, other)),
            }
        }

        match self.document.get(FIELD_AGE_WEEKS) {
            None | Some(Bson::Int32(_)) | Some(Bson::Int64(_)) => {}
            Some(Bson::Double(n)) if n.is_finite() => {}
            Some(Bson::Double(n)) => {
                return Err(ShelterError::Validation(format!(
                    "Field '{}' must be a finite number, got {}",
                    FIELD_AGE_WEEKS, n
                )))
            }
            Some(other) => return Err(unexpected_type(FIELD_AGE_WEEKS, other)),
        }

        validate_field_names(&self.document)
    }
}

fn unexpected_type(key: &str, value: &Bson) -> ShelterError {
    ShelterError::Validation(format!(
        "Field '{}' has unexpected type {:?}",
        key,
        value.element_type()
    ))
}

impl From<BsonDocument> for AnimalRecord {
    fn from(document: BsonDocument) -> Self {
        Self { document }
    }
}

impl From<AnimalRecord> for BsonDocument {
    fn from(record: AnimalRecord) -> Self {
        record.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_typed_accessors() {
        let record = AnimalRecord::from(doc! {
            "animal_id": "A746874",
            "breed": "Labrador Retriever Mix",
            "animal_type": "Dog",
            "age_upon_outcome_in_weeks": 52
        });
        assert_eq!(record.breed(), Some("Labrador Retriever Mix"));
        assert_eq!(record.animal_type(), Some("Dog"));
        assert_eq!(record.age_in_weeks(), Some(52.0));
        assert_eq!(record.get("animal_id"), Some(&Bson::String("A746874".into())));
    }

    #[test]
    fn test_wrong_typed_known_field_is_kept() {
        let record = AnimalRecord::from(doc! { "breed": 42, "age_upon_outcome_in_weeks": "old" });
        assert!(record.breed().is_none());
        assert!(record.age_in_weeks().is_none());
        assert_eq!(record.get("breed"), Some(&Bson::Int32(42)));
    }

    #[test]
    fn test_document_is_passed_through_unchanged() {
        let original = doc! {
            "name": "Rex",
            "age_upon_outcome_in_weeks": 9_007_199_254_740_993_i64,
            "breed": "Pug",
            "animal_type": "Dog"
        };
        let record = AnimalRecord::from(original.clone());
        assert!(record.validate_for_insert().is_ok());

        let written: BsonDocument = record.into();
        assert_eq!(written, original);
        let keys: Vec<&str> = written.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "age_upon_outcome_in_weeks", "breed", "animal_type"]);
        assert_eq!(
            written.get("age_upon_outcome_in_weeks"),
            Some(&Bson::Int64(9_007_199_254_740_993))
        );
    }

    #[test]
    fn test_builders_keep_insertion_order() {
        let record = AnimalRecord::new()
            .with_field("name", "Rex")
            .with_breed("Pug")
            .with_age_in_weeks(10.0)
            .with_breed("Beagle");
        let keys: Vec<&str> = record.document().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "breed", "age_upon_outcome_in_weeks"]);
        assert_eq!(record.breed(), Some("Beagle"));
    }

    #[test]
    fn test_empty_record_rejected() {
        let err = AnimalRecord::new().validate_for_insert().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_wrong_type_rejected_on_insert() {
        let record = AnimalRecord::from(doc! { "breed": 7 });
        let err = record.validate_for_insert().unwrap_err();
        assert!(err.to_string().contains("breed"));

        let record = AnimalRecord::from(doc! { "age_upon_outcome_in_weeks": "ten" });
        assert!(record.validate_for_insert().is_err());
    }

    #[test]
    fn test_non_finite_age_rejected() {
        let record = AnimalRecord::new().with_age_in_weeks(f64::NAN);
        assert!(record.validate_for_insert().is_err());
    }

    #[test]
    fn test_operator_field_rejected() {
        let record = AnimalRecord::new().with_breed("Pug").with_field("$set", doc! { "x": 1 });
        assert!(record.validate_for_insert().is_err());
    }

    #[test]
    fn test_nested_and_boolean_values_accepted() {
        let record = AnimalRecord::new()
            .with_animal_type("Cat")
            .with_field("location", doc! { "lat": 30.27, "long": -97.74 })
            .with_field("neutered", true);
        assert!(record.validate_for_insert().is_ok());
    }
}
