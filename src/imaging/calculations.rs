//! Pure calculation functions for resize planning.
//!
//! All functions here are pure and testable without any I/O or images.
//! The backend turns a [`ResizePlan`] into pixel operations; nothing in this
//! module touches pixels.

use crate::types::Fit;

/// What the backend has to do to honor a width/height/fit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Leave dimensions untouched.
    Keep,
    /// Scale to exactly these dimensions.
    Exact { width: u32, height: u32 },
    /// Scale to `scaled`, then center-crop to `crop`.
    Crop { scaled: (u32, u32), crop: (u32, u32) },
    /// Scale to `scaled`, then center it on a `canvas`-sized background.
    Pad {
        scaled: (u32, u32),
        canvas: (u32, u32),
    },
}

impl ResizePlan {
    /// Dimensions of the image the plan produces.
    pub fn output_dimensions(self, source: (u32, u32)) -> (u32, u32) {
        match self {
            Self::Keep => source,
            Self::Exact { width, height } => (width, height),
            Self::Crop { crop, .. } => crop,
            Self::Pad { canvas, .. } => canvas,
        }
    }

    /// Pixel count of the largest buffer the plan allocates; zero for
    /// [`ResizePlan::Keep`], which allocates nothing beyond the decode.
    pub fn peak_pixels(self) -> u64 {
        let area = |(w, h): (u32, u32)| u64::from(w) * u64::from(h);
        match self {
            Self::Keep => 0,
            Self::Exact { width, height } => area((width, height)),
            Self::Crop { scaled, .. } => area(scaled),
            Self::Pad { scaled, canvas } => area(scaled).max(area(canvas)),
        }
    }
}

/// Decide how to resize `source` for the requested bounds.
///
/// - no bounds → [`ResizePlan::Keep`]
/// - one bound → proportional scale on that axis, `fit` ignored
/// - both bounds → per-[`Fit`] semantics
pub fn plan_resize(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
) -> ResizePlan {
    let plan = match (width, height) {
        (None, None) => return ResizePlan::Keep,
        (Some(w), None) => {
            let (w, h) = scale_to_width(source, w);
            ResizePlan::Exact {
                width: w,
                height: h,
            }
        }
        (None, Some(h)) => {
            let (w, h) = scale_to_height(source, h);
            ResizePlan::Exact {
                width: w,
                height: h,
            }
        }
        (Some(w), Some(h)) => plan_bounded(source, (w, h), fit),
    };

    // Skip the resample when it would be a no-op.
    match plan {
        ResizePlan::Exact { width, height } if (width, height) == source => ResizePlan::Keep,
        other => other,
    }
}

fn plan_bounded(source: (u32, u32), target: (u32, u32), fit: Fit) -> ResizePlan {
    match fit {
        Fit::Fill => ResizePlan::Exact {
            width: target.0,
            height: target.1,
        },
        Fit::Inside => {
            let (w, h) = calculate_inside_dimensions(source, target);
            ResizePlan::Exact {
                width: w,
                height: h,
            }
        }
        Fit::Outside => {
            let (w, h) = calculate_fill_dimensions(source, target);
            ResizePlan::Exact {
                width: w,
                height: h,
            }
        }
        Fit::Cover => {
            let scaled = calculate_fill_dimensions(source, target);
            if scaled == target {
                ResizePlan::Exact {
                    width: target.0,
                    height: target.1,
                }
            } else {
                ResizePlan::Crop {
                    scaled,
                    crop: target,
                }
            }
        }
        Fit::Contain => {
            let scaled = calculate_inside_dimensions(source, target);
            if scaled == target {
                ResizePlan::Exact {
                    width: target.0,
                    height: target.1,
                }
            } else {
                ResizePlan::Pad {
                    scaled,
                    canvas: target,
                }
            }
        }
    }
}

/// Scale proportionally so the width equals `width`.
pub fn scale_to_width(source: (u32, u32), width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let h = (src_h as f64 * width as f64 / src_w as f64).round() as u32;
    (width, h.max(1))
}

/// Scale proportionally so the height equals `height`.
pub fn scale_to_height(source: (u32, u32), height: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let w = (src_w as f64 * height as f64 / src_h as f64).round() as u32;
    (w.max(1), height)
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Calculate the largest dimensions that fit within a target area.
///
/// The mirror of [`calculate_fill_dimensions`]: one dimension matches the
/// target exactly, the other is at most the target.
pub fn calculate_inside_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: width will match, height shrinks
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.clamp(1, tgt_h))
    } else {
        // Source is taller: height will match, width shrinks
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.clamp(1, tgt_w), h)
    }
}

/// Top-left offset that centers `inner` within `outer` on each axis.
pub fn center_offset(outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // plan_resize: bounds handling
    // =========================================================================

    #[test]
    fn no_bounds_keeps_dimensions_for_every_fit() {
        for fit in [Fit::Cover, Fit::Contain, Fit::Fill, Fit::Inside, Fit::Outside] {
            let plan = plan_resize((640, 480), None, None, fit);
            assert_eq!(plan, ResizePlan::Keep);
            assert_eq!(plan.output_dimensions((640, 480)), (640, 480));
        }
    }

    #[test]
    fn width_only_scales_proportionally_regardless_of_fit() {
        for fit in [Fit::Cover, Fit::Contain, Fit::Fill, Fit::Inside, Fit::Outside] {
            assert_eq!(
                plan_resize((400, 200), Some(100), None, fit),
                ResizePlan::Exact {
                    width: 100,
                    height: 50
                }
            );
        }
    }

    #[test]
    fn height_only_scales_proportionally() {
        assert_eq!(
            plan_resize((400, 200), None, Some(100), Fit::Fill),
            ResizePlan::Exact {
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn single_bound_matching_source_is_keep() {
        assert_eq!(
            plan_resize((400, 200), Some(400), None, Fit::Cover),
            ResizePlan::Keep
        );
    }

    // =========================================================================
    // plan_resize: fit semantics with both bounds
    // =========================================================================

    #[test]
    fn fill_ignores_aspect_ratio() {
        let plan = plan_resize((400, 400), Some(200), Some(100), Fit::Fill);
        assert_eq!(
            plan,
            ResizePlan::Exact {
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn inside_fits_within_bounds() {
        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Inside);
        assert_eq!(
            plan,
            ResizePlan::Exact {
                width: 100,
                height: 50
            }
        );
    }

    #[test]
    fn inside_upscales_small_sources() {
        let plan = plan_resize((50, 25), Some(200), Some(200), Fit::Inside);
        assert_eq!(plan.output_dimensions((50, 25)), (200, 100));
    }

    #[test]
    fn outside_covers_bounds_without_cropping() {
        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Outside);
        assert_eq!(
            plan,
            ResizePlan::Exact {
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn cover_scales_then_crops() {
        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Cover);
        assert_eq!(
            plan,
            ResizePlan::Crop {
                scaled: (200, 100),
                crop: (100, 100)
            }
        );
        assert_eq!(plan.output_dimensions((400, 200)), (100, 100));
    }

    #[test]
    fn cover_with_matching_aspect_is_plain_scale() {
        let plan = plan_resize((800, 600), Some(400), Some(300), Fit::Cover);
        assert_eq!(
            plan,
            ResizePlan::Exact {
                width: 400,
                height: 300
            }
        );
    }

    #[test]
    fn contain_scales_then_pads() {
        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Contain);
        assert_eq!(
            plan,
            ResizePlan::Pad {
                scaled: (100, 50),
                canvas: (100, 100)
            }
        );
        assert_eq!(plan.output_dimensions((400, 200)), (100, 100));
    }

    // =========================================================================
    // calculate_fill_dimensions / calculate_inside_dimensions
    // =========================================================================

    #[test]
    fn fill_wider_source_to_portrait_target() {
        // 800x600 (4:3) → 400x500 target
        // Source is wider, so height matches: 500, width = 500 * (4/3) = 667
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 500)), (667, 500));
    }

    #[test]
    fn fill_taller_source_to_landscape_target() {
        assert_eq!(calculate_fill_dimensions((600, 800), (500, 400)), (500, 667));
    }

    #[test]
    fn fill_square_source_to_portrait() {
        // Source is wider (1:1 > 2:3), height matches: 300, width = 300
        assert_eq!(calculate_fill_dimensions((400, 400), (200, 300)), (300, 300));
    }

    #[test]
    fn inside_taller_source() {
        // 600x800 (3:4) into 300x300 → height matches, width = 225
        assert_eq!(calculate_inside_dimensions((600, 800), (300, 300)), (225, 300));
    }

    #[test]
    fn inside_extreme_aspect_never_collapses_to_zero() {
        assert_eq!(calculate_inside_dimensions((10000, 1), (100, 100)), (100, 1));
    }

    #[test]
    fn peak_pixels_counts_the_intermediate_buffer() {
        assert_eq!(ResizePlan::Keep.peak_pixels(), 0);

        // Cover scales to 200x100 before cropping to 100x100
        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Cover);
        assert_eq!(plan.peak_pixels(), 200 * 100);

        let plan = plan_resize((400, 200), Some(100), Some(100), Fit::Contain);
        assert_eq!(plan.peak_pixels(), 100 * 100);
    }

    #[test]
    fn one_bound_on_a_sliver_implies_a_huge_buffer() {
        // 1x2000 strip widened to 16384 keeps its aspect: 16384 x 32768000
        let plan = plan_resize((1, 2000), Some(16_384), None, Fit::Cover);
        assert_eq!(plan.peak_pixels(), 16_384 * 32_768_000);
        assert!(plan.peak_pixels() > 40_000_000);
    }

    #[test]
    fn center_offset_splits_remainder() {
        assert_eq!(center_offset((100, 100), (100, 50)), (0, 25));
        assert_eq!(center_offset((101, 100), (100, 100)), (0, 0));
    }
}
