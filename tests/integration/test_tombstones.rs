//! Deleted vectors keep their bytes on disk.

use std::fs;

use vectoria::storage::{BYTES_PER_F64, TOMBSTONE, decode_records};
use vectoria::{DistanceMetric, NewPoint, SearchParams};

use crate::common::TestDb;

#[test]
fn test_delete_tombstones_record_and_keeps_bytes() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let points = db.add_collection("points", 2, DistanceMetric::Euclidean).unwrap();
    points.insert(NewPoint::new("keep", vec![1.0, 1.0])).unwrap();
    points.insert(NewPoint::new("drop", vec![1.5, -2.25])).unwrap();

    let data_path = test_db.root().join("points.bin");
    let len_before = fs::metadata(&data_path).unwrap().len();

    points.delete_by_id(&["drop"]).unwrap();
    assert_eq!(fs::metadata(&data_path).unwrap().len(), len_before);

    let bytes = fs::read(&data_path).unwrap();
    let needle: Vec<u8> = [1.5f64, -2.25]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    assert_eq!(needle.len(), 2 * BYTES_PER_F64);
    assert!(bytes.windows(needle.len()).any(|w| w == needle.as_slice()));

    let meta = fs::File::open(test_db.root().join("points_meta.bin")).unwrap();
    let records = decode_records(std::io::BufReader::new(meta)).unwrap();
    let dropped = records.iter().find(|r| r.vector_id == "drop").unwrap();
    assert_eq!(dropped.data_start, TOMBSTONE);
    assert_eq!(dropped.payload_start, TOMBSTONE);
    assert!(dropped.is_tombstone());

    let hits = points
        .search(&[1.5, -2.25], &SearchParams::default().with_k(5))
        .unwrap();
    assert!(hits.iter().all(|h| h.id != "drop"));
    assert!(points.get_vector("drop").is_err());
}

#[test]
fn test_reinsert_after_delete() {
    let test_db = TestDb::new();
    {
        let db = test_db.open();
        let points = db.add_collection("points", 1, DistanceMetric::Euclidean).unwrap();
        points.insert(NewPoint::new("x", vec![1.0])).unwrap();
        points.delete_by_id(&["x"]).unwrap();
        points.insert(NewPoint::new("x", vec![2.0])).unwrap();
        assert_eq!(points.get_vector("x").unwrap(), vec![2.0]);
    }

    let db = test_db.open();
    let points = db.collection("points").unwrap();
    assert_eq!(points.list_vectors(), vec!["x"]);
    assert_eq!(points.get_vector("x").unwrap(), vec![2.0]);
}
