//! Region-of-interest polygons: rasterization, downscaling, and the plain-text
//! region file format.

use std::fs;
use std::path::Path;

use opencv::core::{Point, Scalar, Vector, CV_8UC1};
use opencv::imgproc::{fill_poly, LINE_8};
use opencv::prelude::*;

use crate::error::ScanError;

/// A single polygon in source pixel coordinates, `≥ 3` vertices.
pub type Polygon = Vec<(i32, i32)>;

/// One or more polygons whose union defines where motion is measured.
/// An empty region means "the whole frame".
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub polygons: Vec<Polygon>,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Parses the region file format: one polygon per line, whitespace
    /// separated `x y` pairs, `#` comments, blank lines ignored.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = fs::read_to_string(path)?;
        let mut polygons = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let numbers: Result<Vec<i32>, _> = line.split_whitespace().map(str::parse).collect();
            let numbers = numbers
                .map_err(|_| ScanError::RegionInvalid(format!("non-numeric point in: {line}")))?;
            if numbers.len() < 6 || numbers.len() % 2 != 0 {
                return Err(ScanError::RegionInvalid(format!(
                    "polygon needs at least 3 points: {line}"
                )));
            }
            let points = numbers.chunks(2).map(|p| (p[0], p[1])).collect();
            polygons.push(points);
        }
        Ok(Self { polygons })
    }

    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        let mut out = String::new();
        for polygon in &self.polygons {
            let line: Vec<String> = polygon
                .iter()
                .flat_map(|(x, y)| vec![x.to_string(), y.to_string()])
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Rasterizes the region into a single-channel 0/255 mask at `(width, height)`.
    /// An empty region yields an all-255 (fully in-region) mask.
    pub fn build_mask(&self, width: i32, height: i32) -> Result<Mat, ScanError> {
        let size = opencv::core::Size::new(width, height);
        if self.polygons.is_empty() {
            let mut mask = unsafe { Mat::new_size(size, CV_8UC1)? };
            mask.set_to(&Scalar::all(255.0), &opencv::core::no_array())?;
            return Ok(mask);
        }

        let mut mask = Mat::zeros(height, width, CV_8UC1)?.to_mat()?;
        let mut contours: Vector<Vector<Point>> = Vector::new();
        for polygon in &self.polygons {
            if polygon.len() < 3 {
                return Err(ScanError::RegionInvalid(
                    "polygon must have at least 3 points".into(),
                ));
            }
            let points: Vector<Point> = polygon.iter().map(|&(x, y)| Point::new(x, y)).collect();
            contours.push(points);
        }
        fill_poly(
            &mut mask,
            &contours,
            Scalar::all(255.0),
            LINE_8,
            0,
            Point::new(0, 0),
        )?;
        Ok(mask)
    }
}

/// Subsamples `mask` at stride `factor` (no smoothing), matching the detector's
/// downscale of the working frame.
pub fn downscale_mask(mask: &Mat, factor: i32) -> Result<Mat, ScanError> {
    if factor <= 1 {
        return Ok(mask.clone());
    }
    let rows = mask.rows();
    let cols = mask.cols();
    let out_rows = (rows + factor - 1) / factor;
    let out_cols = (cols + factor - 1) / factor;
    let mut out = Mat::zeros(out_rows, out_cols, CV_8UC1)?.to_mat()?;
    for y in 0..out_rows {
        for x in 0..out_cols {
            let src_y = y * factor;
            let src_x = x * factor;
            let value = *mask.at_2d::<u8>(src_y, src_x)?;
            *out.at_2d_mut::<u8>(y, x)? = value;
        }
    }
    Ok(out)
}

/// Zeroes pixels outside the region.
pub fn apply_mask(image: &Mat, mask: &Mat) -> Result<Mat, ScanError> {
    let mut out = Mat::default();
    opencv::core::bitwise_and(image, image, &mut out, mask)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_degenerate_polygon() {
        let dir = std::env::temp_dir().join("dvrscan_region_test_bad");
        fs::write(&dir, "1 1 2 2\n").unwrap();
        let result = Region::load(&dir);
        fs::remove_file(&dir).ok();
        assert!(result.is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = std::env::temp_dir().join("dvrscan_region_test_good");
        let region = Region {
            polygons: vec![vec![(0, 0), (10, 0), (10, 10), (0, 10)]],
        };
        region.save(&dir).unwrap();
        let loaded = Region::load(&dir).unwrap();
        fs::remove_file(&dir).ok();
        assert_eq!(loaded.polygons, region.polygons);
    }
}
