//! Tile grid planning.
//!
//! Splits an image into tiles no larger than the per-axis piece limit that
//! every participating device can allocate.

use super::{Axis, BYTES_PER_PIXEL, DeviceDescriptor, DispatchError};
use crate::schema::{DeviceSelection, SplitRatio, TileLimit};

/// Rectangular image region processed as one device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl Tile {
    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Size of the tile's RGBA8 storage in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.area() * BYTES_PER_PIXEL
    }
}

/// Maximum tile width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePieceLimit {
    pub width: usize,
    pub height: usize,
}

impl TilePieceLimit {
    /// Derive the piece limit for an image from one allocation limit.
    ///
    /// The resulting tile never needs more than `max_alloc_bytes`: the whole
    /// image when it fits, otherwise full-width strips, otherwise
    /// single-row segments.
    pub fn from_alloc(
        max_alloc_bytes: u64,
        image_width: usize,
        image_height: usize,
    ) -> Result<Self, DispatchError> {
        let pixels = usize::try_from(max_alloc_bytes / BYTES_PER_PIXEL as u64).unwrap_or(usize::MAX);
        if pixels == 0 {
            return Err(DispatchError::InvalidLimit {
                axis: Axis::X,
                limit: 0,
            });
        }

        let width = image_width.max(1);
        let height = image_height.max(1);

        let limit = if width.saturating_mul(height) <= pixels {
            Self { width, height }
        } else if width <= pixels {
            Self {
                width,
                height: pixels / width,
            }
        } else {
            Self {
                width: pixels,
                height: 1,
            }
        };
        Ok(limit)
    }

    /// Piece limit shared by all `devices`.
    ///
    /// The smallest allocation wins, and no tile is wider or taller than the
    /// smallest per-launch dispatch limit.
    pub fn for_devices(
        devices: &[&DeviceDescriptor],
        image_width: usize,
        image_height: usize,
    ) -> Result<Self, DispatchError> {
        let min_alloc = devices
            .iter()
            .map(|d| d.max_alloc_bytes)
            .min()
            .unwrap_or(0);
        let max_width = devices
            .iter()
            .map(|d| d.max_tile_width)
            .min()
            .unwrap_or(usize::MAX);
        let max_height = devices
            .iter()
            .map(|d| d.max_tile_height)
            .min()
            .unwrap_or(usize::MAX);

        if max_width == 0 {
            return Err(DispatchError::InvalidLimit {
                axis: Axis::X,
                limit: 0,
            });
        }
        if max_height == 0 {
            return Err(DispatchError::InvalidLimit {
                axis: Axis::Y,
                limit: 0,
            });
        }

        Self::from_alloc(
            min_alloc,
            image_width.min(max_width),
            image_height.min(max_height),
        )
    }

    /// Clamp to a configured tile cap.
    pub fn capped(self, cap: Option<TileLimit>) -> Self {
        match cap {
            Some(cap) => Self {
                width: self.width.min(cap.width),
                height: self.height.min(cap.height),
            },
            None => self,
        }
    }
}

/// Number of pieces needed to cover `dimension` with pieces of `limit`.
#[inline]
fn piece_count(dimension: usize, limit: usize) -> usize {
    dimension.div_ceil(limit)
}

/// Cover `[0, image_width) x [0, image_height)` with tiles.
///
/// Tiles are emitted column by column: every y-piece of the first x-piece,
/// then the next x-piece. The last tile on each axis is clipped to the
/// image boundary.
pub fn plan_tiles(
    image_width: usize,
    image_height: usize,
    piece_limit_x: usize,
    piece_limit_y: usize,
) -> Result<Vec<Tile>, DispatchError> {
    if piece_limit_x == 0 {
        return Err(DispatchError::InvalidLimit {
            axis: Axis::X,
            limit: piece_limit_x,
        });
    }
    if piece_limit_y == 0 {
        return Err(DispatchError::InvalidLimit {
            axis: Axis::Y,
            limit: piece_limit_y,
        });
    }

    let x_pieces = piece_count(image_width, piece_limit_x);
    let y_pieces = piece_count(image_height, piece_limit_y);
    let mut tiles = Vec::with_capacity(x_pieces * y_pieces);

    for x in 0..x_pieces {
        let x_offset = x * piece_limit_x;
        let width = piece_limit_x.min(image_width - x_offset);
        for y in 0..y_pieces {
            let y_offset = y * piece_limit_y;
            let height = piece_limit_y.min(image_height - y_offset);
            tiles.push(Tile {
                x_offset,
                y_offset,
                width,
                height,
            });
        }
    }

    Ok(tiles)
}

/// Dispatch mode chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchMode {
    /// One device processes every tile whole.
    Single,
    /// Two devices split every tile into bands by `ratio`.
    Combo { ratio: SplitRatio },
}

/// Full tile grid plus mode, computed once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub image_width: usize,
    pub image_height: usize,
    pub piece_limit: TilePieceLimit,
    pub mode: DispatchMode,
    pub tiles: Vec<Tile>,
}

impl DispatchPlan {
    /// Plan a run over an image for the given devices.
    pub fn new(
        image_width: usize,
        image_height: usize,
        devices: &[&DeviceDescriptor],
        selection: DeviceSelection,
        ratio: SplitRatio,
        cap: Option<TileLimit>,
    ) -> Result<Self, DispatchError> {
        let mode = if selection.is_combo() {
            if devices.len() != 2 {
                return Err(DispatchError::MissingDevice(devices.len()));
            }
            DispatchMode::Combo { ratio }
        } else {
            DispatchMode::Single
        };

        let piece_limit =
            TilePieceLimit::for_devices(devices, image_width, image_height)?.capped(cap);
        let tiles = plan_tiles(
            image_width,
            image_height,
            piece_limit.width,
            piece_limit.height,
        )?;

        Ok(Self {
            image_width,
            image_height,
            piece_limit,
            mode,
            tiles,
        })
    }
}

/// Horizontal band of a tile assigned to one device in combo mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBand {
    /// First tile-local row.
    pub y_offset: usize,
    /// Number of rows.
    pub rows: usize,
}

/// Split a tile of `height` rows into bands for device A and device B.
///
/// Device A takes `[0, rows_a)`, device B takes `[rows_a, height)`.
pub fn split_bands(height: usize, ratio: SplitRatio) -> (SplitBand, SplitBand) {
    let (rows_a, rows_b) = ratio.split_rows(height);
    (
        SplitBand {
            y_offset: 0,
            rows: rows_a,
        },
        SplitBand {
            y_offset: rows_a,
            rows: rows_b,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DeviceClass;
    use proptest::prelude::*;

    fn coverage(width: usize, height: usize, tiles: &[Tile]) -> Vec<u32> {
        let mut hits = vec![0u32; width * height];
        for t in tiles {
            assert!(t.x_offset + t.width <= width);
            assert!(t.y_offset + t.height <= height);
            for y in t.y_offset..t.y_offset + t.height {
                for x in t.x_offset..t.x_offset + t.width {
                    hits[y * width + x] += 1;
                }
            }
        }
        hits
    }

    #[test]
    fn test_ten_by_ten_limit_four() {
        let tiles = plan_tiles(10, 10, 4, 4).unwrap();
        assert_eq!(tiles.len(), 9);

        let widths: Vec<usize> = tiles.iter().step_by(3).map(|t| t.width).collect();
        let heights: Vec<usize> = tiles.iter().take(3).map(|t| t.height).collect();
        assert_eq!(widths, vec![4, 4, 2]);
        assert_eq!(heights, vec![4, 4, 2]);

        // Column-major emission
        assert_eq!(tiles[1].x_offset, 0);
        assert_eq!(tiles[1].y_offset, 4);
        assert_eq!(tiles[3].x_offset, 4);
        assert_eq!(tiles[3].y_offset, 0);
    }

    #[test]
    fn test_limit_larger_than_image() {
        let tiles = plan_tiles(7, 3, 100, 100).unwrap();
        assert_eq!(
            tiles,
            vec![Tile {
                x_offset: 0,
                y_offset: 0,
                width: 7,
                height: 3
            }]
        );
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(matches!(
            plan_tiles(10, 10, 0, 4),
            Err(DispatchError::InvalidLimit { axis: Axis::X, .. })
        ));
        assert!(matches!(
            plan_tiles(10, 10, 4, 0),
            Err(DispatchError::InvalidLimit { axis: Axis::Y, .. })
        ));
    }

    #[test]
    fn test_empty_image_has_no_tiles() {
        assert!(plan_tiles(0, 10, 4, 4).unwrap().is_empty());
        assert!(plan_tiles(10, 0, 4, 4).unwrap().is_empty());
    }

    #[test]
    fn test_piece_limit_whole_image_fits() {
        let limit = TilePieceLimit::from_alloc(10 * 10 * 4, 10, 10).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: 10,
                height: 10
            }
        );
    }

    #[test]
    fn test_piece_limit_strips() {
        // 250 pixels for a 100-wide image: strips of 2 rows
        let limit = TilePieceLimit::from_alloc(1000, 100, 50).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: 100,
                height: 2
            }
        );
    }

    #[test]
    fn test_piece_limit_row_segments() {
        let limit = TilePieceLimit::from_alloc(64, 100, 50).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: 16,
                height: 1
            }
        );
    }

    #[test]
    fn test_piece_limit_too_small() {
        assert!(TilePieceLimit::from_alloc(3, 10, 10).is_err());
    }

    #[test]
    fn test_piece_limit_uses_smallest_device() {
        let cpu = DeviceDescriptor::new("cpu", DeviceClass::Cpu, 1 << 30);
        let gpu = DeviceDescriptor::new("gpu", DeviceClass::Gpu, 400);
        let limit = TilePieceLimit::for_devices(&[&cpu, &gpu], 20, 20).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: 20,
                height: 5
            }
        );

        // Idempotent: deriving again gives the same answer
        let again = TilePieceLimit::for_devices(&[&cpu, &gpu], 20, 20).unwrap();
        assert_eq!(limit, again);
    }

    #[test]
    fn test_piece_limit_respects_dispatch_limit() {
        // 65535 workgroups of 16 pixels per dimension
        let dispatch = 65_535 * 16;
        let gpu = DeviceDescriptor::new("gpu", DeviceClass::Gpu, 128 << 20)
            .with_dispatch_limit(dispatch, dispatch);
        let limit = TilePieceLimit::for_devices(&[&gpu], 2_000_000, 8).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: dispatch,
                height: 8
            }
        );

        let tiles = plan_tiles(2_000_000, 8, limit.width, limit.height).unwrap();
        assert_eq!(tiles.len(), 2);
        assert!(tiles.iter().all(|t| t.width <= dispatch));
    }

    #[test]
    fn test_piece_limit_dispatch_limit_with_strips() {
        // Width capped at 8 by dispatch, allocation of 40 pixels: 8x5 tiles
        let cpu = DeviceDescriptor::new("cpu", DeviceClass::Cpu, 1 << 30);
        let gpu = DeviceDescriptor::new("gpu", DeviceClass::Gpu, 160).with_dispatch_limit(8, 64);
        let limit = TilePieceLimit::for_devices(&[&cpu, &gpu], 20, 20).unwrap();
        assert_eq!(
            limit,
            TilePieceLimit {
                width: 8,
                height: 5
            }
        );
    }

    #[test]
    fn test_piece_limit_zero_dispatch_limit_rejected() {
        let gpu = DeviceDescriptor::new("gpu", DeviceClass::Gpu, 1 << 20).with_dispatch_limit(0, 4);
        assert!(matches!(
            TilePieceLimit::for_devices(&[&gpu], 10, 10),
            Err(DispatchError::InvalidLimit { axis: Axis::X, .. })
        ));
    }

    #[test]
    fn test_plan_combo_requires_two_devices() {
        let cpu = DeviceDescriptor::new("cpu", DeviceClass::Cpu, 1 << 20);
        let err = DispatchPlan::new(
            8,
            8,
            &[&cpu],
            DeviceSelection::Combo,
            SplitRatio::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::MissingDevice(1)));
    }

    #[test]
    fn test_plan_respects_cap() {
        let cpu = DeviceDescriptor::new("cpu", DeviceClass::Cpu, 1 << 20);
        let plan = DispatchPlan::new(
            10,
            10,
            &[&cpu],
            DeviceSelection::Cpu,
            SplitRatio::default(),
            Some(TileLimit {
                width: 4,
                height: 4,
            }),
        )
        .unwrap();
        assert_eq!(plan.mode, DispatchMode::Single);
        assert_eq!(plan.tiles.len(), 9);
    }

    #[test]
    fn test_split_bands_disjoint() {
        let (a, b) = split_bands(6, SplitRatio::new(0.25));
        assert_eq!(a.y_offset, 0);
        assert_eq!(b.y_offset, a.rows);
        assert_eq!(a.rows + b.rows, 6);
    }

    proptest! {
        #[test]
        fn prop_tiles_cover_exactly_once(
            width in 0usize..40,
            height in 0usize..40,
            lx in 1usize..50,
            ly in 1usize..50,
        ) {
            let tiles = plan_tiles(width, height, lx, ly).unwrap();
            prop_assert_eq!(tiles.len(), width.div_ceil(lx) * height.div_ceil(ly));
            let hits = coverage(width, height, &tiles);
            prop_assert!(hits.iter().all(|&h| h == 1));
        }

        #[test]
        fn prop_piece_limit_fits_allocation(
            alloc in 4u64..100_000,
            width in 1usize..500,
            height in 1usize..500,
        ) {
            let limit = TilePieceLimit::from_alloc(alloc, width, height).unwrap();
            prop_assert!(limit.width >= 1 && limit.height >= 1);
            let tile_width = limit.width.min(width);
            let tile_height = limit.height.min(height);
            prop_assert!((tile_width * tile_height * 4) as u64 <= alloc);
        }

        #[test]
        fn prop_bands_sum_to_height(height in 0usize..5000, ratio in 0.1f64..=0.9) {
            let (a, b) = split_bands(height, SplitRatio::new(ratio));
            prop_assert_eq!(a.rows + b.rows, height);
            prop_assert_eq!(b.y_offset, a.rows);
        }
    }
}
