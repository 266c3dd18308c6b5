use super::Packer;
use crate::error::Result;
use crate::model::{LAYOUT_EPSILON, ObjectId, PackInputObject, PackingTask, PlacedObject};
use crate::runner::CancelToken;
use tracing::{debug, instrument};

/// Next-Fit Decreasing Height shelf packer.
///
/// Objects are sorted by height (stable) and laid out in rows from the usable
/// top-left corner; a row closes as soon as the next object is too wide for it.
pub struct NfdhPacker {
    allow_rotation: bool,
}

impl NfdhPacker {
    pub fn new(allow_rotation: bool) -> Self {
        Self { allow_rotation }
    }

    /// Orientation used for `obj`: as given, or swapped if only that fits.
    fn oriented(&self, task: &PackingTask, obj: &PackInputObject) -> Option<(f64, f64)> {
        let c = &task.container;
        if c.fits(obj.width, obj.height) {
            Some((obj.width, obj.height))
        } else if self.allow_rotation && c.fits(obj.height, obj.width) {
            Some((obj.height, obj.width))
        } else {
            None
        }
    }
}

impl Packer for NfdhPacker {
    fn name(&self) -> &'static str {
        "nfdh"
    }

    #[instrument(skip_all, fields(objects = task.objects.len()))]
    fn pack(&self, task: &PackingTask, cancel: &CancelToken) -> Result<Vec<PlacedObject>> {
        task.validate()?;
        let c = &task.container;
        let mut items: Vec<(ObjectId, f64, f64)> = task
            .objects
            .iter()
            .filter_map(|o| self.oriented(task, o).map(|(w, h)| (o.id, w, h)))
            .collect();
        items.sort_by(|a, b| b.2.total_cmp(&a.2));

        let (left, top) = (c.padding, c.padding);
        let (max_x, max_y) = (c.width - c.padding, c.height - c.padding);
        let mut x = left;
        let mut y = top;
        let mut row_h = 0.0_f64;
        let mut out = Vec::with_capacity(items.len());
        for (id, w, h) in items {
            cancel.check()?;
            if x + w > max_x + LAYOUT_EPSILON {
                x = left;
                y += row_h;
                row_h = 0.0;
            }
            if y + h > max_y + LAYOUT_EPSILON {
                debug!(id, "object does not fit below the last row");
                continue;
            }
            out.push(PlacedObject::from_top_left(id, x, y, w, h));
            x += w;
            row_h = row_h.max(h);
        }
        debug!(placed = out.len(), "nfdh done");
        Ok(out)
    }
}
