use crate::model::Rect;
use crate::raster::OccupancyRaster;
use std::collections::VecDeque;
use tracing::debug;

/// Decomposes the free space of `raster` into pairwise disjoint rectangles.
///
/// Works per 4-connected free component (in scan order of each component's first
/// cell). Inside a component, every still-free cell in scan order seeds the
/// largest-area rectangle having it as top-left corner; that rectangle is taken
/// and cleared. The result covers every free cell exactly once. It is a greedy
/// decomposition, not a maximum empty rectangle search.
pub fn find_empty_areas(raster: &OccupancyRaster) -> Vec<Rect> {
    let (w, h) = (raster.width(), raster.height());
    let mut out = Vec::new();
    let mut labeled = vec![false; w as usize * h as usize];
    let idx = |x: u32, y: u32| y as usize * w as usize + x as usize;
    let mut components = 0usize;

    for sy in 0..h {
        for sx in 0..w {
            if labeled[idx(sx, sy)] || !raster.is_free(sx, sy) {
                continue;
            }
            let cells = flood_fill(raster, &mut labeled, sx, sy);
            components += 1;
            out.extend(decompose_component(&cells));
        }
    }
    debug!(components, rects = out.len(), "empty areas found");
    out
}

/// Collects the 4-connected free component containing `(sx, sy)`.
fn flood_fill(raster: &OccupancyRaster, labeled: &mut [bool], sx: u32, sy: u32) -> Vec<(u32, u32)> {
    let w = raster.width() as usize;
    let mut cells = Vec::new();
    let mut queue = VecDeque::from([(sx, sy)]);
    labeled[sy as usize * w + sx as usize] = true;
    while let Some((x, y)) = queue.pop_front() {
        cells.push((x, y));
        let mut visit = |nx: u32, ny: u32| {
            let i = ny as usize * w + nx as usize;
            if raster.is_free(nx, ny) && !labeled[i] {
                labeled[i] = true;
                queue.push_back((nx, ny));
            }
        };
        if x > 0 {
            visit(x - 1, y);
        }
        if x + 1 < raster.width() {
            visit(x + 1, y);
        }
        if y > 0 {
            visit(x, y - 1);
        }
        if y + 1 < raster.height() {
            visit(x, y + 1);
        }
    }
    cells
}

fn decompose_component(cells: &[(u32, u32)]) -> Vec<Rect> {
    let Some(min_x) = cells.iter().map(|c| c.0).min() else {
        return Vec::new();
    };
    let min_y = cells.iter().map(|c| c.1).min().unwrap_or(0);
    let max_x = cells.iter().map(|c| c.0).max().unwrap_or(min_x);
    let max_y = cells.iter().map(|c| c.1).max().unwrap_or(min_y);
    let (bw, bh) = ((max_x - min_x + 1) as usize, (max_y - min_y + 1) as usize);

    // sub-raster of the bounding box holding only this component's cells
    let mut mask = vec![false; bw * bh];
    for &(x, y) in cells {
        mask[(y - min_y) as usize * bw + (x - min_x) as usize] = true;
    }

    let mut rects = Vec::new();
    for y in 0..bh {
        for x in 0..bw {
            if !mask[y * bw + x] {
                continue;
            }
            let (rw, rh) = largest_rect_from(&mask, bw, bh, x, y);
            for yy in y..y + rh {
                for xx in x..x + rw {
                    mask[yy * bw + xx] = false;
                }
            }
            rects.push(Rect::new(
                min_x + x as u32,
                min_y + y as u32,
                rw as u32,
                rh as u32,
            ));
        }
    }
    rects
}

/// Largest-area rectangle of free mask cells with top-left corner `(x, y)`.
/// Ties keep the first (shortest) candidate.
fn largest_rect_from(mask: &[bool], bw: usize, bh: usize, x: usize, y: usize) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_area = 0;
    let mut min_w = usize::MAX;
    for yy in y..bh {
        if !mask[yy * bw + x] {
            break;
        }
        let run = (x..bw).take_while(|&xx| mask[yy * bw + xx]).count();
        min_w = min_w.min(run);
        let area = min_w * (yy - y + 1);
        if area > best_area {
            best_area = area;
            best = (min_w, yy - y + 1);
        }
    }
    best
}
