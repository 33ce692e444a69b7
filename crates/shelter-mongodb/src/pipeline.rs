//! Average stay by breed aggregation

use crate::record::FIELD_ID;
use crate::Result;
use bson::{doc, Bson, Document as BsonDocument};
use serde::Serialize;
use shelter_common::ShelterError;

/// Output field holding the mean stay
pub const FIELD_AVERAGE: &str = "average_stay_weeks";
/// Output field holding the group size
pub const FIELD_COUNT: &str = "count";

/// Mean outcome age for one breed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreedStayStat {
    pub breed: String,
    pub average_stay_weeks: f64,
    pub count: i64,
}

impl BreedStayStat {
    /// Decode one `$group` output row
    pub fn from_document(doc: &BsonDocument) -> Result<Self> {
        let breed = match doc.get(FIELD_ID) {
            Some(Bson::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(ShelterError::Deserialization(
                    "Aggregation row is missing its group key".to_string(),
                ))
            }
        };

        let average_stay_weeks = match doc.get(FIELD_AVERAGE) {
            Some(Bson::Double(n)) => *n,
            Some(Bson::Int32(n)) => f64::from(*n),
            Some(Bson::Int64(n)) => *n as f64,
            // $avg yields null when no value in the group was numeric
            Some(Bson::Null) => f64::NAN,
            other => {
                return Err(ShelterError::Deserialization(format!(
                    "Unexpected '{}' value for breed '{}': {:?}",
                    FIELD_AVERAGE, breed, other
                )))
            }
        };

        let count = match doc.get(FIELD_COUNT) {
            Some(Bson::Int32(n)) => i64::from(*n),
            Some(Bson::Int64(n)) => *n,
            other => {
                return Err(ShelterError::Deserialization(format!(
                    "Unexpected '{}' value for breed '{}': {:?}",
                    FIELD_COUNT, breed, other
                )))
            }
        };

        Ok(Self {
            breed,
            average_stay_weeks,
            count,
        })
    }
}

/// Build the match → group → sort pipeline
///
/// Ties on the average are broken by breed name so the output order is stable.
pub fn average_stay_pipeline() -> Vec<BsonDocument> {
    vec![
        doc! {
            "$match": {
                "breed": { "$exists": true },
                "age_upon_outcome_in_weeks": { "$exists": true }
            }
        },
        doc! {
            "$group": {
                "_id": "$breed",
                "average_stay_weeks": { "$avg": "$age_upon_outcome_in_weeks" },
                "count": { "$sum": 1 }
            }
        },
        doc! {
            "$sort": { "average_stay_weeks": -1, "_id": 1 }
        }
    ]
}
