use crate::error::{PackingError, Result};
use crate::model::{LAYOUT_EPSILON, PackingContainer, PlacedObject, Rect};
use image::{GrayImage, Luma};

/// Grayscale value at or above which an image pixel counts as free space.
pub const DEFAULT_FREE_THRESHOLD: u8 = 240;

/// Largest raster `from_layout` will allocate.
pub const MAX_RASTER_CELLS: u64 = 1 << 26;

/// Boolean grid of the container, `true` = free cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyRaster {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl OccupancyRaster {
    /// All-free raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![true; width as usize * height as usize],
        }
    }

    /// Builds a raster from row-major cells.
    pub fn from_cells(width: u32, height: u32, cells: Vec<bool>) -> Result<Self> {
        if cells.len() != width as usize * height as usize {
            return Err(PackingError::InvalidInput(format!(
                "raster {}x{} needs {} cells, got {}",
                width,
                height,
                width as usize * height as usize,
                cells.len()
            )));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Rasterizes `boxes` over the whole container with square cells of `cell_size`.
    ///
    /// Conservative: a cell touched by a box is occupied, and so is every cell not
    /// fully inside the usable region. A free cell is therefore free in reality.
    pub fn from_layout(
        container: &PackingContainer,
        boxes: &[PlacedObject],
        cell_size: f64,
    ) -> Result<Self> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(PackingError::InvalidConfig(format!(
                "raster cell size must be positive, got {cell_size}"
            )));
        }
        let cols = (container.width / cell_size).floor().max(0.0);
        let rows = (container.height / cell_size).floor().max(0.0);
        if cols * rows > MAX_RASTER_CELLS as f64 {
            return Err(PackingError::InvalidConfig(format!(
                "a {}x{} container at cell size {cell_size} needs {cols}x{rows} raster cells, \
                 more than {MAX_RASTER_CELLS}; raise the cell size",
                container.width, container.height
            )));
        }
        let (width, height) = (cols as u32, rows as u32);
        let mut raster = Self::new(width, height);

        let p = container.padding;
        let (min_x, max_x) = (p, container.width - p);
        let (min_y, max_y) = (p, container.height - p);
        for y in 0..height {
            for x in 0..width {
                let (l, t) = (x as f64 * cell_size, y as f64 * cell_size);
                let (r, b) = (l + cell_size, t + cell_size);
                let inside = l >= min_x - LAYOUT_EPSILON
                    && t >= min_y - LAYOUT_EPSILON
                    && r <= max_x + LAYOUT_EPSILON
                    && b <= max_y + LAYOUT_EPSILON;
                if !inside {
                    raster.set(x, y, false);
                }
            }
        }

        for bx in boxes {
            let x0 = ((bx.left() + LAYOUT_EPSILON) / cell_size).floor().max(0.0) as u32;
            let y0 = ((bx.top() + LAYOUT_EPSILON) / cell_size).floor().max(0.0) as u32;
            let x1 = (((bx.right() - LAYOUT_EPSILON) / cell_size).ceil().max(0.0) as u32).min(width);
            let y1 = (((bx.bottom() - LAYOUT_EPSILON) / cell_size).ceil().max(0.0) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    raster.set(x, y, false);
                }
            }
        }
        Ok(raster)
    }

    /// Binarizes a grayscale image: pixels `>= threshold` are free.
    pub fn from_image(img: &GrayImage, threshold: u8) -> Self {
        let (width, height) = img.dimensions();
        let cells = img.pixels().map(|Luma([v])| *v >= threshold).collect();
        Self {
            width,
            height,
            cells,
        }
    }

    /// Free cells become white (255), occupied cells black (0).
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.is_free(x, y) { 255 } else { 0 }])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Out-of-range cells read as occupied.
    pub fn is_free(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.cells[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, free: bool) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.cells[i] = free;
        }
    }

    /// Marks every cell of `r` (clipped to the raster) as occupied.
    pub fn fill(&mut self, r: &Rect) {
        for y in r.y..r.bottom().min(self.height) {
            for x in r.x..r.right().min(self.width) {
                self.set(x, y, false);
            }
        }
    }

    pub fn count_free(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Converts a cell rectangle back to container coordinates: `(left, top, width, height)`.
    pub fn cell_rect_to_world(r: &Rect, cell_size: f64) -> (f64, f64, f64, f64) {
        (
            r.x as f64 * cell_size,
            r.y as f64 * cell_size,
            r.w as f64 * cell_size,
            r.h as f64 * cell_size,
        )
    }
}
