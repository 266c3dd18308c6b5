use box_packer_core::prelude::*;
use box_packer_core::OccupancyRaster;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn raster_from_rows(rows: &[&str]) -> OccupancyRaster {
    let h = rows.len() as u32;
    let w = rows[0].len() as u32;
    let cells = rows
        .iter()
        .flat_map(|r| r.chars().map(|c| c == '.'))
        .collect();
    OccupancyRaster::from_cells(w, h, cells).expect("raster")
}

fn disjoint(rects: &[Rect]) -> bool {
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].intersects(&rects[j]) {
                return false;
            }
        }
    }
    true
}

fn covers_exactly_free_cells(raster: &OccupancyRaster, rects: &[Rect]) -> bool {
    for y in 0..raster.height() {
        for x in 0..raster.width() {
            let covered = rects.iter().filter(|r| r.contains_cell(x, y)).count();
            let expected = usize::from(raster.is_free(x, y));
            if covered != expected {
                return false;
            }
        }
    }
    true
}

#[test]
fn fully_free_raster_is_one_rectangle() {
    let raster = OccupancyRaster::new(4, 3);
    assert_eq!(find_empty_areas(&raster), vec![Rect::new(0, 0, 4, 3)]);
}

#[test]
fn fully_occupied_raster_has_no_rectangles() {
    let raster = raster_from_rows(&["##", "##"]);
    assert!(find_empty_areas(&raster).is_empty());
}

#[test]
fn l_shape_keeps_first_best_rectangle() {
    // both the top row and the left column have area 3; the row is found first
    let raster = raster_from_rows(&["...", ".##", ".##"]);
    let rects = find_empty_areas(&raster);
    assert_eq!(rects, vec![Rect::new(0, 0, 3, 1), Rect::new(0, 1, 1, 2)]);
}

#[test]
fn components_are_reported_in_scan_order() {
    let raster = raster_from_rows(&[".#.", ".#.", "###"]);
    let rects = find_empty_areas(&raster);
    assert_eq!(rects, vec![Rect::new(0, 0, 1, 2), Rect::new(2, 0, 1, 2)]);
}

#[test]
fn offset_component_is_translated_to_raster_coordinates() {
    let raster = raster_from_rows(&["#####", "##..#", "##..#", "#####"]);
    assert_eq!(find_empty_areas(&raster), vec![Rect::new(2, 1, 2, 2)]);
}

#[test]
fn random_rasters_are_covered_without_overlap() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let w = rng.gen_range(1..=24);
        let h = rng.gen_range(1..=24);
        let density = rng.gen_range(0.0..0.7);
        let cells = (0..w * h).map(|_| rng.gen_range(0.0..1.0) >= density).collect();
        let raster = OccupancyRaster::from_cells(w, h, cells).expect("raster");
        let rects = find_empty_areas(&raster);
        assert!(disjoint(&rects));
        assert!(covers_exactly_free_cells(&raster, &rects));
        let area: u64 = rects.iter().map(|r| r.area()).sum();
        assert_eq!(area, raster.count_free() as u64);
    }
}

#[test]
fn image_is_binarized_at_threshold() {
    let img = GrayImage::from_fn(4, 2, |x, _| match x {
        0 => Luma([255]),
        1 => Luma([240]),
        2 => Luma([239]),
        _ => Luma([0]),
    });
    let raster = OccupancyRaster::from_image(&img, 240);
    assert_eq!(raster.count_free(), 4);
    assert_eq!(find_empty_areas(&raster), vec![Rect::new(0, 0, 2, 2)]);

    let back = raster.to_image();
    assert_eq!(back.get_pixel(1, 0), &Luma([255]));
    assert_eq!(back.get_pixel(2, 1), &Luma([0]));
}

#[test]
fn layout_raster_is_conservative() {
    let container = PackingContainer::new(10.0, 10.0, 0.0);
    let boxes = [PlacedObject::from_top_left(1, 0.0, 0.0, 5.0, 5.0)];
    let raster = OccupancyRaster::from_layout(&container, &boxes, 1.0).expect("raster");
    assert_eq!(raster.count_free(), 75);

    // a box edge inside a cell occupies the whole cell
    let boxes = [PlacedObject::from_top_left(1, 0.5, 0.0, 2.0, 1.0)];
    let raster = OccupancyRaster::from_layout(&container, &boxes, 1.0).expect("raster");
    assert!(!raster.is_free(0, 0));
    assert!(!raster.is_free(2, 0));
    assert!(raster.is_free(3, 0));
    assert!(raster.is_free(0, 1));
}

#[test]
fn layout_raster_blocks_padding() {
    let container = PackingContainer::new(10.0, 10.0, 1.0);
    let raster = OccupancyRaster::from_layout(&container, &[], 1.0).expect("raster");
    assert_eq!(raster.count_free(), 64);
    assert!(!raster.is_free(0, 5));
    assert!(raster.is_free(1, 1));
    assert_eq!(find_empty_areas(&raster), vec![Rect::new(1, 1, 8, 8)]);
}

#[test]
fn layout_raster_rejects_bad_cell_size() {
    let container = PackingContainer::new(10.0, 10.0, 0.0);
    assert!(OccupancyRaster::from_layout(&container, &[], 0.0).is_err());
}

#[test]
fn layout_raster_refuses_huge_grids() {
    let container = PackingContainer::new(1.0e6, 1.0e6, 0.0);
    let err = OccupancyRaster::from_layout(&container, &[], 1.0).expect_err("too many cells");
    assert!(matches!(err, box_packer_core::PackingError::InvalidConfig(_)));

    // a coarser grid of the same container is fine
    let raster = OccupancyRaster::from_layout(&container, &[], 500.0).expect("coarse raster");
    assert_eq!((raster.width(), raster.height()), (2000, 2000));
    assert!(
        u64::from(raster.width()) * u64::from(raster.height())
            <= box_packer_core::raster::MAX_RASTER_CELLS
    );
}
