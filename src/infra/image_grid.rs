// ============================================================
// Layer 6 — Sample Grid Writer
// ============================================================
// Tiles an ImageSet into one PNG, laid out like torchvision's
// make_grid: `nrow` images per row, `padding` black pixels around
// and between every tile.
//
//   ┌──┬──┬──┐   width  = cols * (w + pad) + pad
//   │  │  │  │   height = rows * (h + pad) + pad
//   ├──┼──┼──┤   cols   = min(nrow, n),  rows = ceil(n / cols)
//   │  │  │  │
//   └──┴──┴──┘
//
// Reference: image crate (RgbImage), torchvision.utils.make_grid

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use std::{fs, path::Path};

use crate::domain::image_set::ImageSet;

pub const GRID_PADDING: usize = 2;

/// Images per row for a square-ish grid of `n` samples.
pub fn grid_nrow(n: usize) -> usize {
    ((n as f64).sqrt().floor() as usize).max(1)
}

/// Grid canvas size `(width, height)` for `n` tiles of `h x w`.
pub fn grid_size(n: usize, nrow: usize, height: usize, width: usize, padding: usize) -> (usize, usize) {
    let cols = nrow.min(n).max(1);
    let rows = n.div_ceil(cols);
    (cols * (width + padding) + padding, rows * (height + padding) + padding)
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

pub fn make_grid(images: &ImageSet, nrow: usize, padding: usize) -> Result<RgbImage> {
    if images.count == 0 {
        bail!("cannot build a grid from zero images");
    }
    if images.channels != 1 && images.channels != 3 {
        bail!("grid needs 1 or 3 channels, got {}", images.channels);
    }

    let (h, w) = (images.height, images.width);
    let (gw, gh) = grid_size(images.count, nrow, h, w, padding);
    let cols = nrow.min(images.count).max(1);
    let plane = h * w;

    let mut canvas = RgbImage::new(gw as u32, gh as u32);
    for i in 0..images.count {
        let (row, col) = (i / cols, i % cols);
        let y0 = row * (h + padding) + padding;
        let x0 = col * (w + padding) + padding;
        let img = images.image(i);

        for y in 0..h {
            for x in 0..w {
                let at = |c: usize| to_u8(img[c * plane + y * w + x]);
                let px = if images.channels == 3 {
                    [at(0), at(1), at(2)]
                } else {
                    let g = at(0);
                    [g, g, g]
                };
                canvas.put_pixel((x0 + x) as u32, (y0 + y) as u32, Rgb(px));
            }
        }
    }
    Ok(canvas)
}

/// Write `images` as a grid PNG, creating parent directories as needed.
pub fn save_grid(images: &ImageSet, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let grid = make_grid(images, grid_nrow(images.count), GRID_PADDING)?;
    grid.save(path)
        .with_context(|| format!("Failed to write sample grid '{}'", path.display()))?;
    tracing::debug!("Saved {} samples to '{}'", images.count, path.display());
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn solid(count: usize, value: f32) -> ImageSet {
        ImageSet::new(vec![value; count * 3 * 4 * 4], count, 3, 4, 4)
    }

    #[test]
    fn test_nrow_is_floor_sqrt() {
        assert_eq!(grid_nrow(256), 16);
        assert_eq!(grid_nrow(10), 3);
        assert_eq!(grid_nrow(1), 1);
    }

    #[test]
    fn test_grid_geometry() {
        // 10 tiles of 4x4, 3 per row → 4 rows
        assert_eq!(grid_size(10, 3, 4, 4, 2), (3 * 6 + 2, 4 * 6 + 2));
        // fewer images than nrow shrinks the row
        assert_eq!(grid_size(2, 8, 4, 4, 2), (2 * 6 + 2, 6 + 2));
    }

    #[test]
    fn test_padding_is_black_and_tiles_filled() {
        let grid = make_grid(&solid(4, 1.0), 2, 2).unwrap();
        assert_eq!(grid.dimensions(), (14, 14));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([255, 255, 255]));
        assert_eq!(grid.get_pixel(6, 2), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(8, 8), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_save_grid_writes_png() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples").join("000100.png");
        save_grid(&solid(9, 0.5), &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (20, 20));
        assert_eq!(loaded.get_pixel(2, 2), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(make_grid(&ImageSet::empty(3, 4, 4), 1, 2).is_err());
    }
}
