//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images. The
//! one rule that holds everywhere: a derivative never upscales — requested
//! dimensions are clamped to the source before any fit math runs.

use super::params::{Fit, Position};

/// Post-resize crop rectangle in output pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The geometry half of a transform: what to resize to, and what to crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    /// Dimensions for the resize pass.
    pub resize_to: (u32, u32),
    /// Crop applied after resizing (only `fit=cover` with both dimensions).
    pub crop: Option<CropRect>,
}

/// Dimensions that completely cover a target box while keeping the source
/// aspect ratio. One dimension matches the target exactly, the other may
/// exceed it (that overflow is what the crop removes).
pub fn cover_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height matches, width overflows
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width matches, height overflows
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Dimensions that fit entirely inside a target box while keeping the source
/// aspect ratio. At most one dimension matches the target.
pub fn contain_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let scale = (tgt_w as f64 / src_w as f64).min(tgt_h as f64 / src_h as f64);
    (
        ((src_w as f64 * scale).round() as u32).max(1),
        ((src_h as f64 * scale).round() as u32).max(1),
    )
}

/// Where a target-sized window sits on the resized canvas.
///
/// A single keyword positions one axis and centers the other, the way CSS
/// `object-position` treats `top` as top-center.
pub fn crop_origin(canvas: (u32, u32), target: (u32, u32), position: Position) -> (u32, u32) {
    let (canvas_w, canvas_h) = canvas;
    let (tgt_w, tgt_h) = target;
    let slack_x = canvas_w.saturating_sub(tgt_w);
    let slack_y = canvas_h.saturating_sub(tgt_h);

    let x = match position {
        Position::Left => 0,
        Position::Right => slack_x,
        _ => slack_x / 2,
    };
    let y = match position {
        Position::Top => 0,
        Position::Bottom => slack_y,
        _ => slack_y / 2,
    };
    (x, y)
}

/// Plan the resize/crop for a transform, or `None` when the source already
/// satisfies the request.
///
/// Requested dimensions are first clamped to the source (never upscale). A
/// single requested dimension is always an aspect-preserving resize — with
/// one axis free there is nothing to crop against, so `cover`, `contain`,
/// and `fill` coincide. With both dimensions set the fit mode decides:
/// `cover` resizes to overflow then crops at `position`, `contain` resizes
/// to fit inside, `fill` resizes to the box exactly.
pub fn plan_resize(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
    position: Position,
) -> Option<ResizePlan> {
    let (src_w, src_h) = source;
    let width = width.map(|w| w.min(src_w).max(1));
    let height = height.map(|h| h.min(src_h).max(1));

    let plan = match (width, height) {
        (None, None) => return None,
        (Some(w), None) => {
            let h = ((src_h as f64 * w as f64 / src_w as f64).round() as u32).max(1);
            ResizePlan {
                resize_to: (w, h),
                crop: None,
            }
        }
        (None, Some(h)) => {
            let w = ((src_w as f64 * h as f64 / src_h as f64).round() as u32).max(1);
            ResizePlan {
                resize_to: (w, h),
                crop: None,
            }
        }
        (Some(w), Some(h)) => match fit {
            Fit::Cover => {
                let canvas = cover_dimensions(source, (w, h));
                if canvas == (w, h) {
                    // Aspect already matches; nothing to crop
                    ResizePlan {
                        resize_to: (w, h),
                        crop: None,
                    }
                } else {
                    let (x, y) = crop_origin(canvas, (w, h), position);
                    ResizePlan {
                        resize_to: canvas,
                        crop: Some(CropRect {
                            x,
                            y,
                            width: w,
                            height: h,
                        }),
                    }
                }
            }
            Fit::Contain => ResizePlan {
                resize_to: contain_dimensions(source, (w, h)),
                crop: None,
            },
            Fit::Fill => ResizePlan {
                resize_to: (w, h),
                crop: None,
            },
        },
    };

    if plan.resize_to == source && plan.crop.is_none() {
        None
    } else {
        Some(plan)
    }
}
