//! State rebuilt from disk after the database is reopened.

use std::fs;

use vectoria::{DistanceMetric, NewPoint, PayloadValue, SearchParams};

use crate::common::{TestDb, sorted_ids};

#[test]
fn test_reopen_restores_vectors_payloads_and_bounds() {
    let test_db = TestDb::new();
    {
        let db = test_db.open();
        let points = db
            .add_collection("points", 2, DistanceMetric::Euclidean)
            .unwrap();
        points
            .insert(NewPoint::new("A", vec![0.0, 0.0]).with_field("label", "origin"))
            .unwrap();
        points.insert(NewPoint::new("B", vec![1.0, 0.0])).unwrap();
        points.insert(NewPoint::new("C", vec![0.0, 1.0])).unwrap();
        points.insert(NewPoint::new("D", vec![5.0, 5.0])).unwrap();
        points.delete_by_id(&["D"]).unwrap();
        db.flush().unwrap();
    }

    let db = test_db.open();
    let points = db.collection("points").unwrap();
    assert_eq!(points.list_vectors(), vec!["A", "B", "C"]);
    assert_eq!(
        points.read_payload("A").unwrap()["label"],
        PayloadValue::from("origin")
    );
    assert_eq!(points.info().diagonal_length, 2.0);

    let hits = points
        .search(&[5.0, 5.0], &SearchParams::default().with_k(2))
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["B", "C"]);

    // The restored collection keeps accepting writes
    points.insert(NewPoint::new("E", vec![2.0, 2.0])).unwrap();
    assert!(points.insert(NewPoint::new("A", vec![9.0, 9.0])).is_err());
}

#[test]
fn test_persisted_config_shape() {
    let test_db = TestDb::new();
    {
        let db = test_db.open();
        let points = db
            .add_collection("shape", 2, DistanceMetric::Euclidean)
            .unwrap();
        points.insert(NewPoint::new("a", vec![0.0, 0.0])).unwrap();
        points.insert(NewPoint::new("b", vec![3.0, 4.0])).unwrap();
        db.flush().unwrap();
    }

    let text = fs::read_to_string(test_db.root().join("shape.json")).unwrap();
    let config: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(config["Name"], "shape");
    assert_eq!(config["VectorDimension"], 2);
    assert_eq!(config["DistanceFuncName"], "euclid");
    assert_eq!(config["DiagonalLength"], 25.0);

    let meta = fs::read_to_string(test_db.root().join("shape_meta.bin")).unwrap();
    let lines: Vec<&str> = meta.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["VectorID"], "a");
    assert_eq!(first["DataStart"], 0);
}

#[test]
fn test_restore_ignores_unknown_index_files() {
    let test_db = TestDb::new();
    {
        let db = test_db.open();
        db.add_collection("points", 1, DistanceMetric::Euclidean)
            .unwrap();
    }
    fs::write(test_db.root().join("stray_indexes.json"), "[]").unwrap();

    let db = test_db.open();
    let names: Vec<String> = db.list_collections().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["points"]);
}

#[test]
fn test_settings_file_drives_open() {
    let test_db = TestDb::new();
    let config_path = test_db.dir.path().join("vectoria.toml");
    let mut settings = test_db.settings();
    settings.search.default_k = 1;
    settings.save(&config_path).unwrap();

    let loaded = vectoria::Settings::load_from(&config_path).unwrap();
    let db = vectoria::VectorDb::open(loaded).unwrap();
    let line = db.add_collection("line", 1, DistanceMetric::Euclidean).unwrap();
    for i in 0..5 {
        line.insert(NewPoint::new(i.to_string(), vec![i as f64])).unwrap();
    }
    let hits = line.search(&[0.0], &SearchParams::default()).unwrap();
    assert_eq!(hits.len(), 1);
}
