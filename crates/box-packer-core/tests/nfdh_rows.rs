use box_packer_core::packer::nfdh::NfdhPacker;
use box_packer_core::prelude::*;

fn disjoint(placed: &[PlacedObject]) -> bool {
    for i in 0..placed.len() {
        for j in (i + 1)..placed.len() {
            if placed[i].overlaps(&placed[j], 1e-9) {
                return false;
            }
        }
    }
    true
}

#[test]
fn nfdh_places_three_objects_in_one_row() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 8.0, 0.0),
        vec![
            PackInputObject::new(1, 4.0, 2.0),
            PackInputObject::new(2, 3.0, 3.0),
            PackInputObject::new(3, 2.0, 4.0),
        ],
    );
    let placed = NfdhPacker::new(true)
        .pack(&task, &CancelToken::new())
        .expect("pack");
    assert_eq!(placed.len(), 3);
    assert!(disjoint(&placed));
    validate_layout(&task, &placed).expect("valid layout");

    // tallest first, left to right on the top row
    let ids: Vec<u32> = placed.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(placed.iter().all(|p| p.top() == 0.0));
}

#[test]
fn nfdh_opens_new_row_and_respects_padding() {
    let task = PackingTask::new(
        PackingContainer::new(12.0, 12.0, 1.0),
        vec![
            PackInputObject::new(1, 6.0, 4.0),
            PackInputObject::new(2, 6.0, 3.0),
            PackInputObject::new(3, 4.0, 2.0),
        ],
    );
    let placed = NfdhPacker::new(false)
        .pack(&task, &CancelToken::new())
        .expect("pack");
    assert_eq!(placed.len(), 3);
    validate_layout(&task, &placed).expect("valid layout");

    let third = placed.iter().find(|p| p.id == 3).expect("object 3");
    assert_eq!(third.left(), 7.0);
    assert_eq!(third.top(), 5.0);
}

#[test]
fn nfdh_rotates_object_that_only_fits_sideways() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 4.0, 0.0),
        vec![PackInputObject::new(7, 3.0, 8.0)],
    );
    let placed = NfdhPacker::new(true)
        .pack(&task, &CancelToken::new())
        .expect("pack");
    assert_eq!(placed.len(), 1);
    assert_eq!((placed[0].width, placed[0].height), (8.0, 3.0));

    let placed = NfdhPacker::new(false)
        .pack(&task, &CancelToken::new())
        .expect("pack");
    assert!(placed.is_empty());
}

#[test]
fn nfdh_skips_objects_below_the_last_row() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 0.0),
        vec![
            PackInputObject::new(1, 10.0, 6.0),
            PackInputObject::new(2, 10.0, 5.0),
            PackInputObject::new(3, 10.0, 4.0),
        ],
    );
    let placed = NfdhPacker::new(false)
        .pack(&task, &CancelToken::new())
        .expect("pack");
    let ids: Vec<u32> = placed.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 3]);
    validate_layout(&task, &placed).expect("valid layout");
}

#[test]
fn nfdh_stops_when_cancelled() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 0.0),
        vec![PackInputObject::new(1, 1.0, 1.0)],
    );
    let token = CancelToken::new();
    token.cancel();
    let err = NfdhPacker::new(true).pack(&task, &token).unwrap_err();
    assert!(matches!(err, box_packer_core::PackingError::Cancelled));
}
