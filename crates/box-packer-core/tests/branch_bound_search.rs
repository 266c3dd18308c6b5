use box_packer_core::prelude::*;
use box_packer_core::{BranchBoundPacker, PackingError};
use std::time::{Duration, Instant};

fn packer(grid_step: f64, allow_rotation: bool) -> BranchBoundPacker {
    BranchBoundPacker::new(
        BranchBoundConfig {
            grid_step,
            time_limit_ms: 10_000,
        },
        allow_rotation,
    )
}

fn sorted_ids(placed: &[PlacedObject]) -> Vec<u32> {
    let mut ids: Vec<u32> = placed.iter().map(|p| p.id).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn fills_a_tight_grid() {
    let objects = (1..=4).map(|id| PackInputObject::new(id, 5.0, 5.0)).collect();
    let task = PackingTask::new(PackingContainer::new(10.0, 10.0, 0.0), objects);
    let placed = packer(5.0, true).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(sorted_ids(&placed), vec![1, 2, 3, 4]);
    validate_layout(&task, &placed).expect("valid layout");
}

#[test]
fn keeps_the_largest_placement_count() {
    // both objects together exceed the container; only the bigger one is kept
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 0.0),
        vec![PackInputObject::new(2, 7.0, 7.0), PackInputObject::new(1, 8.0, 8.0)],
    );
    let placed = packer(1.0, true).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].id, 1);
    assert_eq!((placed[0].left(), placed[0].top()), (0.0, 0.0));
}

#[test]
fn shelf_scenario_places_everything() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 8.0, 0.0),
        vec![
            PackInputObject::new(1, 4.0, 2.0),
            PackInputObject::new(2, 3.0, 3.0),
            PackInputObject::new(3, 2.0, 4.0),
        ],
    );
    let placed = packer(1.0, false).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(sorted_ids(&placed), vec![1, 2, 3]);
    validate_layout(&task, &placed).expect("valid layout");
}

#[test]
fn rotation_is_tried_when_allowed() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 4.0, 0.0),
        vec![PackInputObject::new(1, 3.0, 8.0)],
    );
    let placed = packer(1.0, true).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(placed.len(), 1);
    assert_eq!((placed[0].width, placed[0].height), (8.0, 3.0));
    validate_layout(&task, &placed).expect("valid layout");

    let placed = packer(1.0, false).pack(&task, &CancelToken::new()).expect("pack");
    assert!(placed.is_empty());
}

#[test]
fn lattice_starts_inside_the_padding() {
    let task = PackingTask::new(
        PackingContainer::new(20.0, 20.0, 2.0),
        vec![
            PackInputObject::new(1, 16.0, 10.0),
            PackInputObject::new(2, 16.0, 6.0),
        ],
    );
    let placed = packer(2.0, false).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(sorted_ids(&placed), vec![1, 2]);
    let first = placed.iter().find(|p| p.id == 1).expect("object 1");
    assert_eq!((first.left(), first.top()), (2.0, 2.0));
    validate_layout(&task, &placed).expect("valid layout");
}

#[test]
fn oversize_objects_are_left_out() {
    let task = PackingTask::new(
        PackingContainer::new(50.0, 50.0, 0.0),
        vec![PackInputObject::new(1, 80.0, 10.0), PackInputObject::new(2, 10.0, 10.0)],
    );
    let placed = packer(5.0, true).pack(&task, &CancelToken::new()).expect("pack");
    assert_eq!(sorted_ids(&placed), vec![2]);
}

#[test]
fn time_budget_returns_best_so_far() {
    let objects = (1..=40)
        .map(|id| PackInputObject::new(id, 10.0 + (id % 7) as f64 * 4.0, 12.0 + (id % 5) as f64 * 5.0))
        .collect();
    let task = PackingTask::new(PackingContainer::new(150.0, 150.0, 0.0), objects);
    let packer = BranchBoundPacker::new(
        BranchBoundConfig {
            grid_step: 1.0,
            time_limit_ms: 50,
        },
        true,
    );
    let started = Instant::now();
    let placed = packer.pack(&task, &CancelToken::new()).expect("pack");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!placed.is_empty());
    validate_layout(&task, &placed).expect("valid layout");
}

#[test]
fn cancelled_search_stops() {
    let token = CancelToken::new();
    token.cancel();
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 0.0),
        vec![PackInputObject::new(1, 5.0, 5.0)],
    );
    let err = packer(1.0, true).pack(&task, &token).expect_err("cancelled");
    assert!(matches!(err, PackingError::Cancelled));
}

#[test]
fn degenerate_lattice_is_rejected() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 0.0),
        vec![PackInputObject::new(1, 5.0, 5.0)],
    );
    let err = packer(0.0, true)
        .pack(&task, &CancelToken::new())
        .expect_err("zero step");
    assert!(matches!(err, PackingError::InvalidConfig(_)));

    let cfg = PackerConfig::builder()
        .strategy(StrategyKind::BranchAndBound)
        .grid_step(f64::NAN)
        .build();
    assert!(matches!(pack_task(&task, &cfg), Err(PackingError::InvalidConfig(_))));
}

#[test]
fn selected_through_the_config() {
    let cfg = PackerConfig::builder()
        .strategy(StrategyKind::BranchAndBound)
        .grid_step(5.0)
        .build();
    assert_eq!(build_packer(&cfg).name(), "branch-and-bound");

    let objects = (1..=4).map(|id| PackInputObject::new(id, 5.0, 5.0)).collect();
    let task = PackingTask::new(PackingContainer::new(10.0, 10.0, 0.0), objects);
    let placed = pack_task(&task, &cfg).expect("pack");
    assert_eq!(placed.len(), 4);
}
