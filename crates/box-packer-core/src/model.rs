use crate::error::{PackingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier of an object, unique within one task.
pub type ObjectId = u32;

/// Tolerance used when checking overlap and containment of placed objects.
pub const LAYOUT_EPSILON: f64 = 1e-6;

/// Axis-aligned cell rectangle. `x,y` is top-left; `w,h` are sizes in cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Exclusive right edge (`x + w`).
    pub fn right(&self) -> u32 {
        self.x + self.w
    }
    /// Exclusive bottom edge (`y + h`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
    /// Returns true if `r` is fully inside `self`.
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x && r.y >= self.y && r.right() <= self.right() && r.bottom() <= self.bottom()
    }
    pub fn intersects(&self, r: &Rect) -> bool {
        !(self.x >= r.right() || r.x >= self.right() || self.y >= r.bottom() || r.y >= self.bottom())
    }
    pub fn contains_cell(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
}

/// The box objects are packed into. Units are millimeters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PackingContainer {
    pub width: f64,
    pub height: f64,
    /// Inner margin on every side, subtracted from the usable area.
    #[serde(default)]
    pub padding: f64,
}

impl PackingContainer {
    pub fn new(width: f64, height: f64, padding: f64) -> Self {
        Self {
            width,
            height,
            padding,
        }
    }

    pub fn usable_width(&self) -> f64 {
        self.width - 2.0 * self.padding
    }

    pub fn usable_height(&self) -> f64 {
        self.height - 2.0 * self.padding
    }

    pub fn usable_area(&self) -> f64 {
        self.usable_width().max(0.0) * self.usable_height().max(0.0)
    }

    /// True if an object of `w`x`h` fits the usable area without rotation.
    pub fn fits(&self, w: f64, h: f64) -> bool {
        w <= self.usable_width() + LAYOUT_EPSILON && h <= self.usable_height() + LAYOUT_EPSILON
    }

    /// True if the object fits in at least one of its two orientations.
    pub fn accepts(&self, obj: &PackInputObject) -> bool {
        self.fits(obj.width, obj.height) || self.fits(obj.height, obj.width)
    }
}

/// An un-placed rectangle. Orientation is free unless the object is square.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PackInputObject {
    pub id: ObjectId,
    pub width: f64,
    pub height: f64,
}

impl PackInputObject {
    pub fn new(id: ObjectId, width: f64, height: f64) -> Self {
        Self { id, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }
}

/// A placed object. `width`/`height` are post-rotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlacedObject {
    pub id: ObjectId,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl PlacedObject {
    /// Builds a placement from its top-left corner.
    pub fn from_top_left(id: ObjectId, left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            id,
            center_x: left + width / 2.0,
            center_y: top + height / 2.0,
            width,
            height,
        }
    }
    pub fn left(&self) -> f64 {
        self.center_x - self.width / 2.0
    }
    pub fn top(&self) -> f64 {
        self.center_y - self.height / 2.0
    }
    pub fn right(&self) -> f64 {
        self.center_x + self.width / 2.0
    }
    pub fn bottom(&self) -> f64 {
        self.center_y + self.height / 2.0
    }
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
    /// Area of the intersection of both bounding boxes (0 when disjoint or touching).
    pub fn overlap_area(&self, other: &PlacedObject) -> f64 {
        let w = self.right().min(other.right()) - self.left().max(other.left());
        let h = self.bottom().min(other.bottom()) - self.top().max(other.top());
        if w > 0.0 && h > 0.0 { w * h } else { 0.0 }
    }
    /// True if both bounding boxes overlap by more than `tolerance` on both axes.
    pub fn overlaps(&self, other: &PlacedObject, tolerance: f64) -> bool {
        let w = self.right().min(other.right()) - self.left().max(other.left());
        let h = self.bottom().min(other.bottom()) - self.top().max(other.top());
        w > tolerance && h > tolerance
    }
    /// True if the bounding box lies inside the usable area of `container`.
    pub fn inside(&self, container: &PackingContainer, tolerance: f64) -> bool {
        let p = container.padding;
        self.left() >= p - tolerance
            && self.top() >= p - tolerance
            && self.right() <= container.width - p + tolerance
            && self.bottom() <= container.height - p + tolerance
    }
}

/// One container plus the objects to place in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackingTask {
    pub container: PackingContainer,
    pub objects: Vec<PackInputObject>,
}

impl PackingTask {
    pub fn new(container: PackingContainer, objects: Vec<PackInputObject>) -> Self {
        Self { container, objects }
    }

    /// Parses a task from its JSON form. The task is not validated.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a JSON task file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the task.
    ///
    /// Returns an error if:
    /// - the container has non-positive dimensions or its padding leaves no usable area
    /// - an object has a non-positive or non-finite side
    /// - two objects share an id
    pub fn validate(&self) -> Result<()> {
        let c = &self.container;
        if !(c.width.is_finite() && c.height.is_finite()) || c.width <= 0.0 || c.height <= 0.0 {
            return Err(PackingError::InvalidDimensions {
                width: c.width,
                height: c.height,
            });
        }
        if !c.padding.is_finite() || c.padding < 0.0 {
            return Err(PackingError::InvalidInput(format!(
                "padding must be a non-negative number, got {}",
                c.padding
            )));
        }
        if c.usable_width() <= 0.0 || c.usable_height() <= 0.0 {
            return Err(PackingError::InvalidInput(format!(
                "padding ({}) * 2 leaves no usable area in a {}x{} container",
                c.padding, c.width, c.height
            )));
        }
        let mut seen = HashSet::with_capacity(self.objects.len());
        for obj in &self.objects {
            let valid = |v: f64| v.is_finite() && v > 0.0;
            if !valid(obj.width) || !valid(obj.height) {
                return Err(PackingError::InvalidInput(format!(
                    "object {} has invalid size {}x{}",
                    obj.id, obj.width, obj.height
                )));
            }
            if !seen.insert(obj.id) {
                return Err(PackingError::InvalidInput(format!(
                    "duplicate object id {}",
                    obj.id
                )));
            }
        }
        Ok(())
    }

    /// Objects that fit the usable area in at least one orientation, in input order.
    pub fn acceptable_objects(&self) -> Vec<PackInputObject> {
        self.objects
            .iter()
            .filter(|o| self.container.accepts(o))
            .copied()
            .collect()
    }
}

/// Checks containment, id conservation and pairwise non-overlap of a result.
pub fn validate_layout(task: &PackingTask, placed: &[PlacedObject]) -> Result<()> {
    let input_ids: HashSet<ObjectId> = task.objects.iter().map(|o| o.id).collect();
    let mut seen = HashSet::with_capacity(placed.len());
    for p in placed {
        if !input_ids.contains(&p.id) {
            return Err(PackingError::InvalidLayout(format!(
                "object {} is not part of the task",
                p.id
            )));
        }
        if !seen.insert(p.id) {
            return Err(PackingError::InvalidLayout(format!(
                "object {} placed twice",
                p.id
            )));
        }
        if !p.inside(&task.container, LAYOUT_EPSILON) {
            return Err(PackingError::InvalidLayout(format!(
                "object {} at ({:.3}, {:.3})..({:.3}, {:.3}) leaves the container",
                p.id,
                p.left(),
                p.top(),
                p.right(),
                p.bottom()
            )));
        }
    }
    for i in 0..placed.len() {
        for j in (i + 1)..placed.len() {
            if placed[i].overlaps(&placed[j], LAYOUT_EPSILON) {
                return Err(PackingError::InvalidLayout(format!(
                    "objects {} and {} overlap",
                    placed[i].id, placed[j].id
                )));
            }
        }
    }
    Ok(())
}

/// Statistics about how well a result uses the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackStats {
    /// Number of input objects.
    pub num_objects: usize,
    /// Number of objects present in the result.
    pub num_placed: usize,
    /// Ids of input objects missing from the result, in input order.
    pub unplaced: Vec<ObjectId>,
    /// Sum of placed object areas.
    pub used_area: f64,
    /// Container area after padding.
    pub usable_area: f64,
    /// used_area / usable_area (0.0 to 1.0). Higher is better.
    pub occupancy: f64,
    /// Number of placed objects whose orientation differs from the input.
    pub num_rotated: usize,
    /// Distance between the area-weighted centroid of the placed objects and
    /// the container center, divided by half the container diagonal. 0 when
    /// nothing is placed. Lower means a better balanced load.
    pub center_of_mass_shift: f64,
}

impl PackStats {
    /// Computes statistics for `placed` against the task it was produced from.
    pub fn from_layout(task: &PackingTask, placed: &[PlacedObject]) -> Self {
        let placed_ids: HashSet<ObjectId> = placed.iter().map(|p| p.id).collect();
        let unplaced = task
            .objects
            .iter()
            .filter(|o| !placed_ids.contains(&o.id))
            .map(|o| o.id)
            .collect();
        let used_area: f64 = placed.iter().map(|p| p.area()).sum();
        let usable_area = task.container.usable_area();
        let occupancy = if usable_area > 0.0 {
            used_area / usable_area
        } else {
            0.0
        };
        let num_rotated = placed
            .iter()
            .filter(|p| {
                task.objects.iter().any(|o| {
                    o.id == p.id
                        && !o.is_square()
                        && (o.width - p.width).abs() > LAYOUT_EPSILON
                })
            })
            .count();
        Self {
            center_of_mass_shift: center_of_mass_shift(&task.container, placed),
            num_objects: task.objects.len(),
            num_placed: placed.len(),
            unplaced,
            used_area,
            usable_area,
            occupancy,
            num_rotated,
        }
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Placed: {}/{}, Occupancy: {:.2}%, Used Area: {:.1} mm², Usable Area: {:.1} mm², Rotated: {}, COM Shift: {:.3}",
            self.num_placed,
            self.num_objects,
            self.occupancy * 100.0,
            self.used_area,
            self.usable_area,
            self.num_rotated,
            self.center_of_mass_shift,
        )
    }

    /// Returns the uncovered usable area.
    pub fn wasted_area(&self) -> f64 {
        (self.usable_area - self.used_area).max(0.0)
    }
}

fn center_of_mass_shift(container: &PackingContainer, placed: &[PlacedObject]) -> f64 {
    let total: f64 = placed.iter().map(|p| p.area()).sum();
    let half_diagonal = container.width.hypot(container.height) / 2.0;
    if total <= 0.0 || half_diagonal <= 0.0 {
        return 0.0;
    }
    let cx = placed.iter().map(|p| p.area() * p.center_x).sum::<f64>() / total;
    let cy = placed.iter().map(|p| p.area() * p.center_y).sum::<f64>() / total;
    let shift = (cx - container.width / 2.0).hypot(cy - container.height / 2.0);
    shift / half_diagonal
}
