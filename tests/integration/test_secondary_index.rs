//! Payload-keyed secondary indexes.

use vectoria::{DistanceMetric, NewPoint, PayloadValue, SearchParams};

use crate::common::{TestDb, sorted_ids};

fn seed(db: &vectoria::VectorDb) -> std::sync::Arc<vectoria::Collection> {
    let fleet = db.add_collection("fleet", 2, DistanceMetric::Euclidean).unwrap();
    for (id, coords, kind, year) in [
        ("car-1", [0.0, 0.0], "car", 2019i64),
        ("car-2", [4.0, 4.0], "car", 2021),
        ("bus-1", [0.5, 0.5], "bus", 2019),
        ("bike-1", [0.1, 0.0], "bike", 2022),
    ] {
        fleet
            .insert(
                NewPoint::new(id, coords.to_vec())
                    .with_field("kind", kind)
                    .with_field("year", year),
            )
            .unwrap();
    }
    fleet
}

#[test]
fn test_index_search_restricts_to_value() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let fleet = seed(&db);
    fleet.create_index("by_kind", "kind").unwrap();

    let params = SearchParams::default().with_k(3);
    let hits = fleet
        .index_search("by_kind", &"car".into(), &[0.0, 0.0], &params)
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["car-1", "car-2"]);
    assert_eq!(hits[0].id, "car-1");

    let info = fleet.info();
    assert_eq!(info.indexes.len(), 1);
    assert_eq!(info.indexes[0].key, "kind");
}

#[test]
fn test_integer_index_and_deletes() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let fleet = seed(&db);
    fleet.create_index("by_year", "year").unwrap();

    let params = SearchParams::default().with_k(5);
    let year = PayloadValue::Integer(2019);
    let hits = fleet
        .index_search("by_year", &year, &[0.0, 0.0], &params)
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["bus-1", "car-1"]);

    fleet.delete_by_id(&["car-1"]).unwrap();
    let hits = fleet
        .index_search("by_year", &year, &[0.0, 0.0], &params)
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["bus-1"]);

    let none = fleet
        .index_search("by_year", &PayloadValue::Integer(1999), &[0.0, 0.0], &params)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_indexes_survive_restart() {
    let test_db = TestDb::new();
    {
        let db = test_db.open();
        let fleet = seed(&db);
        fleet.create_index("by_kind", "kind").unwrap();
        fleet
            .insert(NewPoint::new("bus-2", vec![9.0, 9.0]).with_field("kind", "bus"))
            .unwrap();
    }
    assert!(test_db.root().join("fleet_indexes.json").exists());

    let db = test_db.open();
    let fleet = db.collection("fleet").unwrap();
    let hits = fleet
        .index_search(
            "by_kind",
            &"bus".into(),
            &[0.0, 0.0],
            &SearchParams::default().with_k(5),
        )
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["bus-1", "bus-2"]);

    fleet.delete_index("by_kind").unwrap();
    drop(fleet);
    drop(db);

    let db = test_db.open();
    assert!(db.collection("fleet").unwrap().list_indexes().is_empty());
}
