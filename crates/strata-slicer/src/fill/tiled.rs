//! Tile-by-tile filling of large regions.

use rayon::prelude::*;
use strata_math::Point2;

use crate::clip;
use crate::fill::{CurveSet, RegionFill};
use crate::path::Polygon;
use crate::region::Region;

/// Splits a region on a square grid and fills each piece independently.
#[derive(Debug, Clone)]
pub struct TiledFill {
    /// Edge length of a tile.
    pub tile_size: f64,
    /// Strategy applied to every tile.
    pub inner: Box<RegionFill>,
}

impl TiledFill {
    /// Tile with `inner` as the per-tile strategy.
    pub fn new(tile_size: f64, inner: RegionFill) -> Self {
        Self {
            tile_size,
            inner: Box::new(inner),
        }
    }

    /// Fill every tile of `region` in parallel, in row-major tile order.
    pub fn compute(&self, region: &Region) -> Vec<CurveSet> {
        if self.tile_size <= 0.0 {
            return self.inner.compute(region).curve_sets;
        }
        let (min, max) = region.bounds();
        let nx = ((max.x - min.x) / self.tile_size).ceil().max(1.0) as usize;
        let ny = ((max.y - min.y) / self.tile_size).ceil().max(1.0) as usize;

        let tiles: Vec<Region> = (0..ny)
            .flat_map(|j| (0..nx).map(move |i| (i, j)))
            .map(|(i, j)| {
                let lo = Point2::new(
                    min.x + i as f64 * self.tile_size,
                    min.y + j as f64 * self.tile_size,
                );
                let hi = Point2::new(lo.x + self.tile_size, lo.y + self.tile_size);
                Region::simple(Polygon::rectangle(lo, hi))
            })
            .collect();

        tiles
            .par_iter()
            .map(|tile| {
                clip::intersection(std::slice::from_ref(region), std::slice::from_ref(tile))
                    .iter()
                    .flat_map(|piece| self.inner.compute(piece).curve_sets)
                    .filter(|set| !set.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::{FillType, LinesFill};

    #[test]
    fn test_tiles_cover_region() {
        let region = Region::simple(Polygon::rectangle(Point2::origin(), Point2::new(30.0, 20.0)));
        let lines = LinesFill::new(0.4, 2.0, 0.0, FillType::SparseInfill);
        let whole = RegionFill::Raster(lines.clone()).compute(&region).curve_sets;
        let tiled = TiledFill::new(10.0, RegionFill::Raster(lines)).compute(&region);

        // Six tiles, same total line length as filling in one piece.
        assert_eq!(tiled.len(), 6);
        let total: f64 = tiled.iter().map(CurveSet::length).sum();
        let expected: f64 = whole.iter().map(CurveSet::length).sum();
        assert!((total - expected).abs() < 1e-6);
    }
}
