//! End-to-end k-NN behaviour over a real database directory.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectoria::{DistanceMetric, NewPoint, SearchParams};

use crate::common::{TestDb, sorted_ids};

#[test]
fn test_four_point_scenario() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let points = db
        .add_collection("plane", 2, DistanceMetric::Euclidean)
        .unwrap();

    for (id, coords) in [
        ("A", [0.0, 0.0]),
        ("B", [1.0, 0.0]),
        ("C", [0.0, 1.0]),
        ("D", [5.0, 5.0]),
    ] {
        points.insert(NewPoint::new(id, coords.to_vec())).unwrap();
    }

    let params = SearchParams::default().with_k(2);
    let hits = points.search(&[0.0, 0.0], &params).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "A");
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits[1].id == "B" || hits[1].id == "C");
    assert_eq!(hits[1].distance, 1.0);

    points.delete_by_id(&["A"]).unwrap();
    let hits = points.search(&[0.0, 0.0], &params).unwrap();
    assert_eq!(sorted_ids(&hits), vec!["B", "C"]);
    assert!(hits.iter().all(|h| h.distance == 1.0));
}

#[test]
fn test_unpruned_search_matches_brute_force() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let cloud = db
        .add_collection("cloud", 3, DistanceMetric::Euclidean)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let mut stored = Vec::new();
    for i in 0..300 {
        let coords: Vec<f64> = (0..3).map(|_| rng.random_range(-50.0..50.0)).collect();
        let id = format!("v{i}");
        cloud.insert(NewPoint::new(id.clone(), coords.clone())).unwrap();
        stored.push((id, coords));
    }

    let params = SearchParams::default()
        .with_k(10)
        .with_pruning_factor(f64::INFINITY);
    for _ in 0..20 {
        let target: Vec<f64> = (0..3).map(|_| rng.random_range(-60.0..60.0)).collect();

        let mut expected: Vec<(f64, &str)> = stored
            .iter()
            .map(|(id, coords)| {
                (
                    DistanceMetric::Euclidean.distance(coords, &target),
                    id.as_str(),
                )
            })
            .collect();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        expected.truncate(10);

        let hits = cloud.search(&target, &params).unwrap();
        let found: Vec<(f64, &str)> = hits.iter().map(|h| (h.distance, h.id.as_str())).collect();
        assert_eq!(found, expected);
    }
}

#[test]
fn test_cosine_collection() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let docs = db.add_collection("docs", 2, DistanceMetric::Cosine).unwrap();

    docs.insert(NewPoint::new("east", vec![1.0, 0.0])).unwrap();
    docs.insert(NewPoint::new("north", vec![0.0, 1.0])).unwrap();
    docs.insert(NewPoint::new("far-east", vec![10.0, 0.5])).unwrap();

    let params = SearchParams::default()
        .with_k(2)
        .with_pruning_factor(f64::INFINITY)
        .with_max_distance_percent(0.5);
    let hits = docs.search(&[2.0, 0.0], &params).unwrap();
    // The distance cut only applies to euclidean collections
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "east");
    assert!(hits[0].distance.abs() < 1e-12);
    assert_eq!(hits[1].id, "far-east");
}

#[test]
fn test_rebuild_twice_answers_the_same() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let grid = db.add_collection("grid", 2, DistanceMetric::Euclidean).unwrap();
    for x in 0..8 {
        for y in 0..8 {
            grid.insert(NewPoint::new(format!("{x}-{y}"), vec![x as f64, y as f64]))
                .unwrap();
        }
    }

    let params = SearchParams::default()
        .with_k(5)
        .with_pruning_factor(f64::INFINITY);
    let before = grid.search(&[3.2, 4.7], &params).unwrap();
    grid.rebuild().unwrap();
    grid.rebuild().unwrap();
    let after = grid.search(&[3.2, 4.7], &params).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_concurrent_searches() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let line = db.add_collection("line", 1, DistanceMetric::Euclidean).unwrap();
    for i in 0..100 {
        line.insert(NewPoint::new(i.to_string(), vec![i as f64])).unwrap();
    }

    std::thread::scope(|scope| {
        for t in 0..4 {
            let line = &line;
            scope.spawn(move || {
                let target = [t as f64 * 20.0];
                let params = SearchParams::default()
                    .with_k(1)
                    .with_pruning_factor(f64::INFINITY);
                let hits = line.search(&target, &params).unwrap();
                assert_eq!(hits[0].id, (t * 20).to_string());
            });
        }
    });
}

#[test]
fn test_default_pruning_is_approximate() {
    let test_db = TestDb::new();
    let db = test_db.open();
    let strip = db.add_collection("strip", 2, DistanceMetric::Euclidean).unwrap();
    for (id, coords) in [("root", [5.0, 0.0]), ("far", [9.0, 0.0]), ("near", [4.9, 0.0])] {
        strip.insert(NewPoint::new(id, coords.to_vec())).unwrap();
    }

    // The default factor (0.1 of a 4.1 extent) does not reach across the
    // 0.5 gap to the splitting plane
    let hits = strip
        .search(&[5.5, 0.0], &SearchParams::default().with_k(2))
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["root", "far"]);

    let params = SearchParams::default()
        .with_k(2)
        .with_pruning_factor(f64::INFINITY);
    let hits = strip.search(&[5.5, 0.0], &params).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["root", "near"]);
}
