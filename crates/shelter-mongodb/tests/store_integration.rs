//! Store behaviour against the in-memory collection.

use bson::doc;
use shelter_mongodb::{AnimalRecord, AnimalRecordStore, BreedStayStat, MemoryCollection};

async fn open_store() -> AnimalRecordStore<MemoryCollection> {
    AnimalRecordStore::open(MemoryCollection::new("animals"))
        .await
        .unwrap()
}

fn dog(name: &str, breed: &str, weeks: f64) -> AnimalRecord {
    AnimalRecord::new()
        .with_field("name", name)
        .with_animal_type("Dog")
        .with_breed(breed)
        .with_age_in_weeks(weeks)
}

async fn seed(store: &AnimalRecordStore<MemoryCollection>) {
    for record in [
        dog("Rex", "Lab", 4.0),
        dog("Ace", "Lab", 6.0),
        dog("Bo", "Pug", 10.0),
    ] {
        assert!(store.create(&record).await.unwrap());
    }
}

#[tokio::test]
async fn test_create_then_read_all_strips_identifier() {
    let store = open_store().await;
    let record = dog("Rex", "Lab", 4.0).with_field("neutered", true);

    assert!(store.create(&record).await.unwrap());

    let all = store.read(None).await.unwrap();
    assert_eq!(all, vec![record]);
    assert!(all[0].get("_id").is_none());
    // The store itself did assign one
    assert!(store.collection().documents()[0].get_object_id("_id").is_ok());
}

#[tokio::test]
async fn test_read_by_unique_field_round_trips() {
    let store = open_store().await;
    seed(&store).await;
    let record = AnimalRecord::new()
        .with_field("animal_id", "A721199")
        .with_animal_type("Cat")
        .with_field("outcome", doc! { "type": "Adoption", "subtype": "Foster" });
    store.create(&record).await.unwrap();

    let found = store
        .read(Some(&doc! { "animal_id": "A721199" }))
        .await
        .unwrap();
    assert_eq!(found, vec![record]);
}

#[tokio::test]
async fn test_create_stores_document_as_given() {
    let store = open_store().await;
    let original = doc! {
        "animal_id": "A700002",
        "age_upon_outcome_in_weeks": 12,
        "breed": "Pug"
    };
    store.create(&AnimalRecord::from(original.clone())).await.unwrap();

    let found = store.read(Some(&doc! { "animal_id": "A700002" })).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].document(), &original);
    assert_eq!(found[0].age_in_weeks(), Some(12.0));
}

#[tokio::test]
async fn test_empty_query_matches_all() {
    let store = open_store().await;
    seed(&store).await;

    assert_eq!(store.read(None).await.unwrap().len(), 3);
    assert_eq!(store.read(Some(&doc! {})).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_read_with_no_matches_is_ok_and_empty() {
    let store = open_store().await;
    seed(&store).await;

    let found = store.read(Some(&doc! { "breed": "Beagle" })).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_create_empty_record_writes_nothing() {
    let store = open_store().await;

    let err = store.create(&AnimalRecord::new()).await.unwrap_err();
    assert!(err.is_validation());
    assert!(store.collection().is_empty());
}

#[tokio::test]
async fn test_update_merges_fields_and_counts_modified_only() {
    let store = open_store().await;
    seed(&store).await;

    // Rex already has 4 weeks, so only Ace changes
    let modified = store
        .update(
            &doc! { "breed": "Lab" },
            &doc! { "age_upon_outcome_in_weeks": 4.0 },
        )
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let labs = store.read(Some(&doc! { "breed": "Lab" })).await.unwrap();
    assert!(labs.iter().all(|r| r.age_in_weeks() == Some(4.0)));
    // Untouched fields survive the merge
    assert!(labs.iter().all(|r| r.animal_type() == Some("Dog")));
    assert!(labs.iter().all(|r| r.get("name").is_some()));
}

#[tokio::test]
async fn test_update_count_never_exceeds_matches() {
    let store = open_store().await;
    seed(&store).await;

    for (query, patch) in [
        (doc! { "breed": "Lab" }, doc! { "status": "adopted" }),
        (doc! { "breed": "Pug" }, doc! { "breed": "Pug" }),
        (doc! { "breed": "Beagle" }, doc! { "status": "adopted" }),
        (doc! { "animal_type": "Dog" }, doc! { "status": "adopted" }),
    ] {
        let matching = store.read(Some(&query)).await.unwrap().len() as u64;
        let modified = store.update(&query, &patch).await.unwrap();
        assert!(modified <= matching, "{modified} > {matching} for {query}");
    }
}

#[tokio::test]
async fn test_delete_empty_query_is_rejected() {
    let store = open_store().await;
    seed(&store).await;

    let err = store.delete(&doc! {}).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(store.collection().len(), 3);
}

#[tokio::test]
async fn test_delete_removes_matches() {
    let store = open_store().await;
    seed(&store).await;

    assert_eq!(store.delete(&doc! { "breed": "Lab" }).await.unwrap(), 2);
    assert_eq!(store.delete(&doc! { "breed": "Lab" }).await.unwrap(), 0);

    let remaining = store.read(None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].breed(), Some("Pug"));
}

#[tokio::test]
async fn test_average_stay_by_breed() {
    let store = open_store().await;
    seed(&store).await;
    // Records missing either field are left out of the aggregation
    store
        .create(&AnimalRecord::new().with_breed("Pug").with_field("name", "Nameless"))
        .await
        .unwrap();
    store
        .create(&AnimalRecord::new().with_age_in_weeks(99.0))
        .await
        .unwrap();

    let stats = store.average_stay_by_breed().await.unwrap();
    assert_eq!(
        stats,
        vec![
            BreedStayStat {
                breed: "Pug".to_string(),
                average_stay_weeks: 10.0,
                count: 1
            },
            BreedStayStat {
                breed: "Lab".to_string(),
                average_stay_weeks: 5.0,
                count: 2
            },
        ]
    );
}

#[tokio::test]
async fn test_average_stay_ties_break_by_breed() {
    let store = open_store().await;
    for record in [dog("A", "Pug", 8.0), dog("B", "Beagle", 8.0), dog("C", "Lab", 8.0)] {
        store.create(&record).await.unwrap();
    }

    let breeds: Vec<String> = store
        .average_stay_by_breed()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.breed)
        .collect();
    assert_eq!(breeds, vec!["Beagle", "Lab", "Pug"]);
}

#[tokio::test]
async fn test_average_stay_on_empty_collection() {
    let store = open_store().await;
    assert!(store.average_stay_by_breed().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_index_creation_is_idempotent() {
    let store = open_store().await;
    store.ensure_indexes().await.unwrap();

    let reopened = AnimalRecordStore::open(MemoryCollection::new("animals"))
        .await
        .unwrap();
    reopened.ensure_indexes().await.unwrap();

    for indexes in [store.collection().index_names(), reopened.collection().index_names()] {
        assert_eq!(
            indexes,
            vec!["breed_1", "animal_type_1", "age_upon_outcome_in_weeks_1"]
        );
    }
}

#[tokio::test]
async fn test_store_errors_are_distinguishable_and_recoverable() {
    let store = open_store().await;
    seed(&store).await;
    store.collection().set_unavailable(true);

    let read = store.read(None).await.unwrap_err();
    let update = store
        .update(&doc! { "breed": "Lab" }, &doc! { "status": "x" })
        .await
        .unwrap_err();
    let delete = store.delete(&doc! { "breed": "Lab" }).await.unwrap_err();
    let create = store.create(&dog("Zed", "Lab", 1.0)).await.unwrap_err();
    let aggregate = store.average_stay_by_breed().await.unwrap_err();
    for err in [read, update, delete, create, aggregate] {
        assert!(err.is_store_error(), "{err}");
        assert!(!err.is_validation());
    }

    // Validation still wins over store failures
    assert!(store.delete(&doc! {}).await.unwrap_err().is_validation());

    store.collection().set_unavailable(false);
    assert_eq!(store.read(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_open_fails_when_collection_unavailable() {
    let collection = MemoryCollection::new("animals");
    collection.set_unavailable(true);

    let err = match AnimalRecordStore::open(collection).await {
        Ok(_) => panic!("open should fail"),
        Err(e) => e,
    };
    assert!(err.is_store_error());
}
