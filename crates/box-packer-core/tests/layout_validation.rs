use box_packer_core::PackingError;
use box_packer_core::prelude::*;

fn task() -> PackingTask {
    PackingTask::new(
        PackingContainer::new(100.0, 100.0, 5.0),
        vec![
            PackInputObject::new(1, 40.0, 20.0),
            PackInputObject::new(2, 30.0, 30.0),
            PackInputObject::new(3, 10.0, 60.0),
        ],
    )
}

#[test]
fn test_valid_layout_passes() {
    let placed = vec![
        PlacedObject::from_top_left(1, 5.0, 5.0, 40.0, 20.0),
        // touching edges is fine
        PlacedObject::from_top_left(2, 45.0, 5.0, 30.0, 30.0),
    ];
    validate_layout(&task(), &placed).expect("valid");
}

#[test]
fn test_overlap_is_reported() {
    let placed = vec![
        PlacedObject::from_top_left(1, 5.0, 5.0, 40.0, 20.0),
        PlacedObject::from_top_left(2, 40.0, 10.0, 30.0, 30.0),
    ];
    let err = validate_layout(&task(), &placed).expect_err("overlap");
    assert!(matches!(err, PackingError::InvalidLayout(_)));
    assert!(err.to_string().contains("overlap"));
}

#[test]
fn test_padding_is_off_limits() {
    let placed = vec![PlacedObject::from_top_left(1, 2.0, 5.0, 40.0, 20.0)];
    assert!(validate_layout(&task(), &placed).is_err());

    let placed = vec![PlacedObject::from_top_left(2, 65.0, 65.0, 30.0, 30.0)];
    assert!(validate_layout(&task(), &placed).is_ok());
    let placed = vec![PlacedObject::from_top_left(2, 66.0, 65.0, 30.0, 30.0)];
    assert!(validate_layout(&task(), &placed).is_err());
}

#[test]
fn test_unknown_and_duplicate_ids() {
    let placed = vec![PlacedObject::from_top_left(9, 5.0, 5.0, 10.0, 10.0)];
    let err = validate_layout(&task(), &placed).expect_err("unknown id");
    assert!(err.to_string().contains("not part of the task"));

    let placed = vec![
        PlacedObject::from_top_left(2, 5.0, 5.0, 30.0, 30.0),
        PlacedObject::from_top_left(2, 50.0, 50.0, 30.0, 30.0),
    ];
    let err = validate_layout(&task(), &placed).expect_err("duplicate id");
    assert!(err.to_string().contains("placed twice"));
}

#[test]
fn test_placed_object_geometry() {
    let p = PlacedObject::from_top_left(1, 10.0, 20.0, 30.0, 40.0);
    assert_eq!((p.center_x, p.center_y), (25.0, 40.0));
    assert_eq!((p.left(), p.top(), p.right(), p.bottom()), (10.0, 20.0, 40.0, 60.0));
    let q = PlacedObject::from_top_left(2, 30.0, 50.0, 30.0, 30.0);
    assert_eq!(p.overlap_area(&q), 10.0 * 10.0);
    assert!(p.overlaps(&q, 1e-6));
    assert!(!p.overlaps(&q, 10.0));
}

#[test]
fn test_pack_stats_basic() {
    let task = task();
    let placed = vec![
        PlacedObject::from_top_left(1, 5.0, 5.0, 40.0, 20.0),
        PlacedObject::from_top_left(3, 5.0, 25.0, 60.0, 10.0),
    ];
    let stats = PackStats::from_layout(&task, &placed);

    assert_eq!(stats.num_objects, 3);
    assert_eq!(stats.num_placed, 2);
    assert_eq!(stats.unplaced, vec![2]);
    assert_eq!(stats.used_area, 800.0 + 600.0);
    assert_eq!(stats.usable_area, 90.0 * 90.0);
    assert!((stats.occupancy - 1400.0 / 8100.0).abs() < 1e-12);
    // object 3 went in sideways
    assert_eq!(stats.num_rotated, 1);
    assert_eq!(stats.wasted_area(), 8100.0 - 1400.0);
}

#[test]
fn test_pack_stats_summary() {
    let task = task();
    let stats = PackStats::from_layout(&task, &[]);
    assert_eq!(stats.occupancy, 0.0);
    assert_eq!(stats.unplaced, vec![1, 2, 3]);

    let summary = stats.summary();
    assert!(summary.contains("Placed: 0/3"));
    assert!(summary.contains("Occupancy: 0.00%"));
}

#[test]
fn test_pack_stats_serialize() {
    let task = task();
    let placed = vec![PlacedObject::from_top_left(2, 5.0, 5.0, 30.0, 30.0)];
    let stats = PackStats::from_layout(&task, &placed);
    let json = serde_json::to_value(&stats).expect("serialize");
    assert_eq!(json["num_placed"], 1);
    assert_eq!(json["unplaced"], serde_json::json!([1, 3]));
}

#[test]
fn test_center_of_mass_shift() {
    let task = PackingTask::new(
        PackingContainer::new(100.0, 100.0, 0.0),
        vec![PackInputObject::new(1, 10.0, 10.0), PackInputObject::new(2, 10.0, 10.0)],
    );
    assert_eq!(PackStats::from_layout(&task, &[]).center_of_mass_shift, 0.0);

    let centered = [PlacedObject::from_top_left(1, 45.0, 45.0, 10.0, 10.0)];
    assert_eq!(PackStats::from_layout(&task, &centered).center_of_mass_shift, 0.0);

    // (5, 5) is 45√2 away from the center, half the diagonal is 50√2
    let corner = [PlacedObject::from_top_left(1, 0.0, 0.0, 10.0, 10.0)];
    let stats = PackStats::from_layout(&task, &corner);
    assert!((stats.center_of_mass_shift - 0.9).abs() < 1e-12);
    assert!(stats.summary().contains("COM Shift: 0.900"));

    // opposite corners balance out
    let balanced = [
        PlacedObject::from_top_left(1, 0.0, 0.0, 10.0, 10.0),
        PlacedObject::from_top_left(2, 90.0, 90.0, 10.0, 10.0),
    ];
    assert!(PackStats::from_layout(&task, &balanced).center_of_mass_shift.abs() < 1e-12);
}
