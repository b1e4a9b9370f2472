//! Collection management through the database registry.

use serde_json::json;
use vectoria::storage::payload_from_json;
use vectoria::{DistanceMetric, Filter, NewPoint, Operator, PayloadValue, SearchParams, VdbError};

use crate::common::TestDb;

#[test]
fn test_create_insert_list_delete() {
    let test_db = TestDb::new();
    let db = test_db.open();

    let products = db
        .add_collection("products", 3, DistanceMetric::Euclidean)
        .unwrap();
    let payload = payload_from_json(json!({
        "name": "lamp",
        "price": 19.5,
        "stock": 3,
        "tags": ["home", "light"],
    }))
    .unwrap();
    let id = products
        .insert(NewPoint::anonymous(vec![0.1, 0.2, 0.3]).with_payload(payload.clone()))
        .unwrap();

    assert_eq!(products.list_vectors(), vec![id.clone()]);
    assert_eq!(products.read_payload(&id).unwrap(), payload);
    assert_eq!(products.get_vector(&id).unwrap(), vec![0.1, 0.2, 0.3]);

    let infos = db.list_collections();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "products");
    assert_eq!(infos[0].dimension, 3);
    assert_eq!(infos[0].node_count, 1);

    db.delete_collection("products").unwrap();
    assert!(matches!(
        db.collection("products"),
        Err(VdbError::CollectionNotFound(_))
    ));
    assert!(std::fs::read_dir(test_db.root()).unwrap().next().is_none());
}

#[test]
fn test_validation_errors_are_reported() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let points = db
        .add_collection("points", 2, DistanceMetric::Euclidean)
        .unwrap();
    points.insert(NewPoint::new("a", vec![1.0, 2.0])).unwrap();

    let errors = [
        points.insert(NewPoint::new("b", vec![1.0])).unwrap_err(),
        points.insert(NewPoint::new("a", vec![3.0, 4.0])).unwrap_err(),
        points.delete_by_id(&["missing"]).unwrap_err(),
        points
            .search(&[0.0, 0.0, 0.0], &SearchParams::default())
            .unwrap_err(),
        db.add_collection("bad name", 2, DistanceMetric::Euclidean)
            .unwrap_err(),
        db.insert("ghost", NewPoint::new("x", vec![0.0, 0.0]))
            .unwrap_err(),
    ];
    for err in &errors {
        assert!(err.is_validation(), "{err} should be a validation error");
    }
    assert_eq!(points.len(), 1);
}

#[test]
fn test_filters_and_delete_by_filter() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let shop = db.add_collection("shop", 1, DistanceMetric::Euclidean).unwrap();

    for (id, x, price, category) in [
        ("p1", 1.0, 5i64, "tools"),
        ("p2", 2.0, 15, "tools"),
        ("p3", 3.0, 25, "garden"),
        ("p4", 4.0, 35, "garden"),
    ] {
        shop.insert(
            NewPoint::new(id, vec![x])
                .with_field("price", price)
                .with_field("category", category),
        )
        .unwrap();
    }

    let params = SearchParams::default()
        .with_k(10)
        .with_pruning_factor(f64::INFINITY)
        .with_filter(Filter::parse("price", "gt", 10i64).unwrap())
        .with_filter(Filter::new("category", Operator::Eq, "garden"));
    let hits = shop.search(&[0.0], &params).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["p3", "p4"]);
    assert_eq!(hits[0].payload["price"], PayloadValue::Integer(25));

    assert_eq!(
        Filter::parse("price", "between", 1i64).unwrap_err().status_code(),
        "INVALID_OPERATOR"
    );

    let deleted = shop
        .delete_by_filter(&[Filter::new("price", Operator::Lt, 20.0)])
        .unwrap();
    assert_eq!(deleted, vec!["p1", "p2"]);
    assert_eq!(shop.list_vectors(), vec!["p3", "p4"]);
}

#[test]
fn test_batch_insert() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let points = db
        .add_collection("batch", 2, DistanceMetric::Euclidean)
        .unwrap();

    let ids = points
        .insert_batch(vec![
            NewPoint::new("a", vec![0.0, 0.0]),
            NewPoint::anonymous(vec![1.0, 1.0]),
        ])
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "a");

    let err = points
        .insert_batch(vec![
            NewPoint::new("c", vec![2.0, 2.0]),
            NewPoint::new("a", vec![3.0, 3.0]),
        ])
        .unwrap_err();
    assert!(matches!(err, VdbError::BatchFailed { position: 1, .. }));
    assert_eq!(points.len(), 3);
}
