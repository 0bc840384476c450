// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-space geometry: bounding boxes, rescaling into raster space, and
// intersection-over-union.

use serde::{Deserialize, Serialize};

use crate::error::{ExamcutError, Result};

/// Axis-aligned box in *page* space.
///
/// Coordinates are integer pixels relative to the page the box was computed
/// against (`page_width` x `page_height`). `right` and `bottom` are exclusive.
/// Boxes from different page spaces are not comparable until one is passed
/// through [`BoundingBox::rescaled_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub page_width: u32,
    pub page_height: u32,
}

/// A crop rectangle in raster-buffer pixels, always at least 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Create a box, rejecting empty or inverted extents.
    pub fn new(
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        page_width: u32,
        page_height: u32,
    ) -> Result<Self> {
        if right <= left || bottom <= top {
            return Err(ExamcutError::InvalidBox(format!(
                "({left},{top})-({right},{bottom}) has no area"
            )));
        }
        if page_width == 0 || page_height == 0 {
            return Err(ExamcutError::InvalidBox(format!(
                "page space {page_width}x{page_height} is empty"
            )));
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
            page_width,
            page_height,
        })
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Vertical centre, used to order lines inside a column.
    pub fn center_y(&self) -> i32 {
        self.top + self.height() / 2
    }

    /// Whether both boxes were captured against the same page dimensions.
    pub fn same_space(&self, other: &BoundingBox) -> bool {
        self.page_width == other.page_width && self.page_height == other.page_height
    }

    /// Express this box in another page space, scaling each axis
    /// independently. Edges are rounded outward so the box never shrinks to
    /// nothing.
    pub fn rescaled_to(&self, page_width: u32, page_height: u32) -> Result<Self> {
        if self.page_width == page_width && self.page_height == page_height {
            return Ok(*self);
        }
        let sx = page_width as f64 / self.page_width as f64;
        let sy = page_height as f64 / self.page_height as f64;
        let left = (self.left as f64 * sx).floor() as i32;
        let top = (self.top as f64 * sy).floor() as i32;
        let right = ((self.right as f64 * sx).ceil() as i32).max(left + 1);
        let bottom = ((self.bottom as f64 * sy).ceil() as i32).max(top + 1);
        Self::new(left, top, right, bottom, page_width, page_height)
    }

    /// Shift each edge outward by the given amounts (negative shrinks),
    /// clamped to the page. Falls back to the original box if the adjustment
    /// would collapse it.
    pub fn expanded(&self, top: i32, bottom: i32, left: i32, right: i32) -> Self {
        let new_left = (self.left - left).clamp(0, self.page_width as i32);
        let new_top = (self.top - top).clamp(0, self.page_height as i32);
        let new_right = (self.right + right).clamp(0, self.page_width as i32);
        let new_bottom = (self.bottom + bottom).clamp(0, self.page_height as i32);
        Self::new(
            new_left,
            new_top,
            new_right,
            new_bottom,
            self.page_width,
            self.page_height,
        )
        .unwrap_or(*self)
    }

    /// Inflate uniformly by `padding` pixels on every side, clamped to the page.
    pub fn inflated(&self, padding: i32) -> Self {
        self.expanded(padding, padding, padding, padding)
    }

    /// Map into a raster buffer of `raster_width` x `raster_height`.
    ///
    /// Scale is `raster / page` per axis. All edges are clamped into the
    /// raster and the result is at least 1x1; otherwise
    /// [`ExamcutError::DegenerateRegion`] is returned.
    pub fn to_raster_rect(&self, raster_width: u32, raster_height: u32) -> Result<PixelRect> {
        let sx = raster_width as f64 / self.page_width as f64;
        let sy = raster_height as f64 / self.page_height as f64;

        let max_x = raster_width as i64;
        let max_y = raster_height as i64;

        let left = ((self.left as f64 * sx).floor() as i64).clamp(0, (max_x - 1).max(0));
        let top = ((self.top as f64 * sy).floor() as i64).clamp(0, (max_y - 1).max(0));
        let right = ((self.right as f64 * sx).ceil() as i64).clamp(0, max_x);
        let bottom = ((self.bottom as f64 * sy).ceil() as i64).clamp(0, max_y);

        let width = right - left;
        let height = bottom - top;
        if width < 1 || height < 1 {
            return Err(ExamcutError::DegenerateRegion { width, height });
        }

        Ok(PixelRect {
            x: left as u32,
            y: top as u32,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Intersection-over-union with a box in the same page space.
    ///
    /// Returns `None` when the page spaces differ. Boxes that do not overlap
    /// on either axis yield `Some(0.0)`.
    pub fn iou(&self, other: &BoundingBox) -> Option<f64> {
        if !self.same_space(other) {
            return None;
        }
        let overlap_w = self.right.min(other.right) - self.left.max(other.left);
        let overlap_h = self.bottom.min(other.bottom) - self.top.max(other.top);
        if overlap_w <= 0 || overlap_h <= 0 {
            return Some(0.0);
        }
        let intersection = overlap_w as i64 * overlap_h as i64;
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return Some(0.0);
        }
        Some(intersection as f64 / union as f64)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{} {}x{} @{}x{}]",
            self.left,
            self.top,
            self.width(),
            self.height(),
            self.page_width,
            self.page_height
        )
    }
}
