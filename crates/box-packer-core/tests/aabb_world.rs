use box_packer_core::PackingError;
use box_packer_core::physics_world::{
    AabbWorld, BodyHandle, BoxBodyDesc, PhysicsWorld, Pose, Vec2, normalize_angle,
    orientation_extent,
};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

const DT: f64 = 1.0 / 60.0;

fn world_with_floor() -> AabbWorld {
    let mut world = AabbWorld::new(Vec2::new(0.0, 1000.0), 0.9, 50);
    world
        .add_static_segment(Vec2::new(-100.0, 100.0), Vec2::new(100.0, 100.0))
        .expect("floor");
    world
}

fn square(x: f64, y: f64) -> BoxBodyDesc {
    BoxBodyDesc {
        width: 10.0,
        height: 10.0,
        mass: 0.1,
        friction: 0.5,
        elasticity: 0.0,
        pose: Pose::new(Vec2::new(x, y), 0.0),
    }
}

#[test]
fn box_falls_and_rests_on_floor() {
    let mut world = world_with_floor();
    let h = world.add_dynamic_box(&square(0.0, 20.0)).expect("box");
    for _ in 0..240 {
        world.step(DT).expect("step");
    }
    let pose = world.pose(h).expect("pose");
    assert!((pose.position.y - 95.0).abs() < 1e-9, "y = {}", pose.position.y);
    assert!(pose.position.x.abs() < 1e-9);
}

#[test]
fn stacked_boxes_do_not_overlap() {
    let mut world = world_with_floor();
    let low = world.add_dynamic_box(&square(0.0, 70.0)).expect("low");
    let high = world.add_dynamic_box(&square(0.0, 40.0)).expect("high");
    for _ in 0..300 {
        world.step(DT).expect("step");
    }
    let low = world.pose(low).expect("low pose").position;
    let high = world.pose(high).expect("high pose").position;
    assert!((low.y - 95.0).abs() < 1e-6);
    assert!((high.y - 85.0).abs() < 1e-2, "high y = {}", high.y);
    assert!(low.y - high.y >= 10.0 - 1e-2);
}

#[test]
fn walls_keep_boxes_inside() {
    let mut world = world_with_floor();
    world
        .add_static_segment(Vec2::new(20.0, -1000.0), Vec2::new(20.0, 100.0))
        .expect("wall");
    let h = world.add_dynamic_box(&square(10.0, 50.0)).expect("box");
    world.set_velocity(h, Vec2::new(600.0, 0.0), 0.0).expect("velocity");
    for _ in 0..120 {
        world.step(DT).expect("step");
    }
    let p = world.pose(h).expect("pose").position;
    assert!(p.x + 5.0 <= 20.0 + 1e-9, "x = {}", p.x);
}

#[test]
fn rejects_slanted_segments() {
    let mut world = AabbWorld::new(Vec2::new(0.0, 1000.0), 0.9, 10);
    let err = world
        .add_static_segment(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0))
        .expect_err("slanted segment");
    assert!(matches!(err, PackingError::Backend(_)));
}

#[test]
fn unknown_and_removed_handles_fail() {
    let mut world = world_with_floor();
    assert!(matches!(world.pose(BodyHandle(7)), Err(PackingError::Backend(_))));
    let h = world.add_dynamic_box(&square(0.0, 0.0)).expect("box");
    assert_eq!(world.body_count(), 1);
    world.remove_body(h).expect("remove");
    assert_eq!(world.body_count(), 0);
    assert!(world.pose(h).is_err());
    assert!(world.apply_impulse(h, Vec2::new(1.0, 0.0)).is_err());
}

#[test]
fn invalid_step_and_body_are_rejected() {
    let mut world = world_with_floor();
    assert!(world.step(0.0).is_err());
    assert!(world.step(f64::NAN).is_err());
    let mut desc = square(0.0, 0.0);
    desc.mass = 0.0;
    assert!(world.add_dynamic_box(&desc).is_err());
}

#[test]
fn locked_rotation_ignores_spin() {
    let mut world = world_with_floor();
    let h = world.add_dynamic_box(&square(0.0, 95.0)).expect("box");
    world.set_rotation_locked(h, true).expect("lock");
    world.set_velocity(h, Vec2::ZERO, 5.0).expect("spin");
    world.step(DT).expect("step");
    assert_eq!(world.pose(h).expect("pose").angle, 0.0);

    world.set_rotation_locked(h, false).expect("unlock");
    world.set_velocity(h, Vec2::ZERO, 5.0).expect("spin");
    world.step(DT).expect("step");
    assert!(world.pose(h).expect("pose").angle > 0.0);
}

#[test]
fn set_pose_teleports() {
    let mut world = world_with_floor();
    let h = world.add_dynamic_box(&square(0.0, 0.0)).expect("box");
    world
        .set_pose(h, Pose::new(Vec2::new(30.0, 40.0), FRAC_PI_2))
        .expect("set pose");
    let pose = world.pose(h).expect("pose");
    assert_eq!(pose.position, Vec2::new(30.0, 40.0));
    assert_eq!(pose.angle, FRAC_PI_2);
}

#[test]
fn extents_follow_quarter_turns() {
    assert_eq!(orientation_extent(10.0, 20.0, 0.0), (10.0, 20.0));
    assert_eq!(orientation_extent(10.0, 20.0, FRAC_PI_2), (20.0, 10.0));
    assert_eq!(orientation_extent(10.0, 20.0, PI), (10.0, 20.0));
    assert_eq!(orientation_extent(10.0, 20.0, -FRAC_PI_2), (20.0, 10.0));
    let (w, h) = orientation_extent(10.0, 20.0, FRAC_PI_4);
    let expected = 30.0 * FRAC_PI_4.cos();
    assert!((w - expected).abs() < 1e-9);
    assert!((h - expected).abs() < 1e-9);
}

#[test]
fn angles_normalize_into_one_turn() {
    assert_eq!(normalize_angle(0.0), 0.0);
    assert!((normalize_angle(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-12);
    assert!(normalize_angle(TAU) < 1e-12);
    let tiny = normalize_angle(-1e-20);
    assert!((0.0..TAU).contains(&tiny));
}
