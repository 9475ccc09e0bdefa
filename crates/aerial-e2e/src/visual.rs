//! Screenshot comparison against a stored baseline.

use image::{GenericImageView, Rgba};

use crate::result::{E2eError, E2eResult};

/// Default per-pixel color tolerance (sum of channel deltas)
pub const DEFAULT_COLOR_THRESHOLD: u8 = 10;

/// Rectangle excluded from comparison (timestamps, spinners, attribution)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRegion {
    /// Left
    pub x: u32,
    /// Top
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl MaskRegion {
    /// Create a new mask
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && x < self.x.saturating_add(self.width)
            && y >= self.y
            && y < self.y.saturating_add(self.height)
    }
}

/// Result of a pixel comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDiff {
    /// Pixels over the color threshold
    pub differing: u64,
    /// Pixels compared
    pub total: u64,
    /// `(expected, actual)` sizes when they differ
    pub size_mismatch: Option<((u32, u32), (u32, u32))>,
}

impl PixelDiff {
    /// Whether the images are comparable and differ by at most `max_pixels`
    #[must_use]
    pub const fn within(&self, max_pixels: u64) -> bool {
        self.size_mismatch.is_none() && self.differing <= max_pixels
    }

    /// Fail unless [`Self::within`]
    pub fn assert_within(&self, max_pixels: u64) -> E2eResult<()> {
        if self.within(max_pixels) {
            return Ok(());
        }
        let actual = match self.size_mismatch {
            Some((e, a)) => format!("size {}x{} vs baseline {}x{}", a.0, a.1, e.0, e.1),
            None => format!("{} differing pixels of {}", self.differing, self.total),
        };
        Err(E2eError::assertion(
            "screenshot matches baseline",
            format!("at most {max_pixels} differing pixels"),
            actual,
        ))
    }
}

fn channel_delta(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    let Rgba([r1, g1, b1, _]) = a;
    let Rgba([r2, g2, b2, _]) = b;
    (i32::from(r1) - i32::from(r2)).unsigned_abs()
        + (i32::from(g1) - i32::from(g2)).unsigned_abs()
        + (i32::from(b1) - i32::from(b2)).unsigned_abs()
}

/// Compare two encoded images
pub fn compare_png(expected: &[u8], actual: &[u8], color_threshold: u8) -> E2eResult<PixelDiff> {
    compare_png_masked(expected, actual, color_threshold, &[])
}

/// Compare two encoded images, skipping masked regions
pub fn compare_png_masked(
    expected: &[u8],
    actual: &[u8],
    color_threshold: u8,
    masks: &[MaskRegion],
) -> E2eResult<PixelDiff> {
    let decode = |bytes: &[u8], which: &str| {
        image::load_from_memory(bytes).map_err(|e| E2eError::Decode {
            context: format!("{which} screenshot"),
            message: e.to_string(),
            body: format!("{} bytes", bytes.len()),
        })
    };
    let expected = decode(expected, "baseline")?;
    let actual = decode(actual, "actual")?;

    let expected_size = expected.dimensions();
    let actual_size = actual.dimensions();
    if expected_size != actual_size {
        return Ok(PixelDiff {
            differing: 0,
            total: 0,
            size_mismatch: Some((expected_size, actual_size)),
        });
    }

    let expected = expected.to_rgba8();
    let actual = actual.to_rgba8();
    let (width, height) = expected_size;
    let mut diff = PixelDiff {
        differing: 0,
        total: 0,
        size_mismatch: None,
    };
    for y in 0..height {
        for x in 0..width {
            if masks.iter().any(|m| m.contains(x, y)) {
                continue;
            }
            diff.total += 1;
            if channel_delta(*expected.get_pixel(x, y), *actual.get_pixel(x, y))
                > u32::from(color_threshold)
            {
                diff.differing += 1;
            }
        }
    }
    tracing::debug!(differing = diff.differing, total = diff.total, "screenshot compared");
    Ok(diff)
}
