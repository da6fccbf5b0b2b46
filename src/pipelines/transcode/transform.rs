// SPDX-License-Identifier: GPL-3.0-only

//! Geometry of the story export
//!
//! The source frame goes through four steps, in order:
//!
//! 1. orientation: undo the rotation recorded in the `image-orientation` tag
//! 2. mirror: flip horizontally to cancel the selfie mirror
//! 3. scale: uniform, so the target is covered in one axis exactly
//! 4. translate: centre the crop in the other axis
//!
//! The composed [`Affine`] is the reference description. The export graph
//! realises it as a [`RenderPlan`]: one `videoflip` direction for steps 1-2,
//! a `videoscale` size for step 3 and a `videocrop` for step 4.

use crate::config::FrameSize;

/// 2D affine transform
///
/// Maps `(x, y)` to `(a·x + c·y + tx, b·x + d·y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// Horizontal mirror of an image `width` pixels wide
    pub fn mirror(width: f64) -> Self {
        Self {
            a: -1.0,
            tx: width,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `next`
    pub fn then(self, next: Affine) -> Affine {
        Affine {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Uniform scale factor, ignoring rotation and reflection
    pub fn scale_factor(&self) -> f64 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }
}

/// Rotation recorded in a stream's `image-orientation` tag
///
/// `quarter_turns` are clockwise; `flipped` means the image is mirrored
/// horizontally before rotating, like GStreamer's `flip-rotate-*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub quarter_turns: u8,
    pub flipped: bool,
}

impl Orientation {
    pub const UPRIGHT: Self = Self {
        quarter_turns: 0,
        flipped: false,
    };

    pub fn rotated(degrees: u32) -> Self {
        Self {
            quarter_turns: ((degrees / 90) % 4) as u8,
            flipped: false,
        }
    }

    /// Parse a tag value such as `rotate-90` or `flip-rotate-270`
    ///
    /// Unknown values are treated as upright.
    pub fn from_tag(tag: &str) -> Self {
        let (flipped, rest) = match tag.strip_prefix("flip-") {
            Some(rest) => (true, rest),
            None => (false, tag),
        };
        let degrees = rest
            .strip_prefix("rotate-")
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|d| d % 90 == 0);
        match degrees {
            Some(degrees) => Self {
                flipped,
                ..Self::rotated(degrees)
            },
            None => Self::UPRIGHT,
        }
    }

    /// 90° and 270° swap width and height
    pub fn swaps_axes(&self) -> bool {
        self.quarter_turns % 2 == 1
    }

    pub fn apply_to(&self, natural: FrameSize) -> FrameSize {
        if self.swaps_axes() {
            natural.transposed()
        } else {
            natural
        }
    }

    /// Transform from natural pixel coordinates to upright coordinates
    pub fn transform(&self, natural: FrameSize) -> Affine {
        let w = f64::from(natural.width);
        let h = f64::from(natural.height);
        let flip = if self.flipped {
            Affine::mirror(w)
        } else {
            Affine::IDENTITY
        };
        let rotate = match self.quarter_turns % 4 {
            1 => Affine {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                tx: h,
                ty: 0.0,
            },
            2 => Affine {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                tx: w,
                ty: h,
            },
            3 => Affine {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                tx: 0.0,
                ty: w,
            },
            _ => Affine::IDENTITY,
        };
        flip.then(rotate)
    }
}

/// `videoflip` direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipMethod {
    Identity,
    Clockwise,
    Rotate180,
    CounterClockwise,
    Horizontal,
    Vertical,
    /// Flip across the upper-left/lower-right diagonal
    UpperLeftDiagonal,
    /// Flip across the upper-right/lower-left diagonal
    UpperRightDiagonal,
}

impl FlipMethod {
    /// Classify the linear part of an orthogonal transform
    pub fn from_affine(m: &Affine) -> Self {
        let sign = |v: f64| {
            if v > 0.5 {
                1
            } else if v < -0.5 {
                -1
            } else {
                0
            }
        };
        match (sign(m.a), sign(m.b), sign(m.c), sign(m.d)) {
            (1, 0, 0, 1) => FlipMethod::Identity,
            (-1, 0, 0, 1) => FlipMethod::Horizontal,
            (1, 0, 0, -1) => FlipMethod::Vertical,
            (-1, 0, 0, -1) => FlipMethod::Rotate180,
            (0, 1, -1, 0) => FlipMethod::Clockwise,
            (0, -1, 1, 0) => FlipMethod::CounterClockwise,
            (0, 1, 1, 0) => FlipMethod::UpperLeftDiagonal,
            (0, -1, -1, 0) => FlipMethod::UpperRightDiagonal,
            _ => FlipMethod::Identity,
        }
    }

    /// Nick of the `video-direction` property value
    pub fn nick(&self) -> &'static str {
        match self {
            FlipMethod::Identity => "identity",
            FlipMethod::Clockwise => "90r",
            FlipMethod::Rotate180 => "180",
            FlipMethod::CounterClockwise => "90l",
            FlipMethod::Horizontal => "horiz",
            FlipMethod::Vertical => "vert",
            FlipMethod::UpperLeftDiagonal => "ul-lr",
            FlipMethod::UpperRightDiagonal => "ur-ll",
        }
    }
}

/// Pixels removed from each edge after scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crop {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// The export geometry, both as a matrix and as element settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPlan {
    pub transform: Affine,
    pub flip: FlipMethod,
    /// Upright source size
    pub effective: FrameSize,
    /// Size after `videoscale`, before cropping
    pub scaled: FrameSize,
    pub crop: Crop,
    pub target: FrameSize,
}

impl RenderPlan {
    pub fn scale(&self) -> f64 {
        self.transform.scale_factor()
    }
}

/// Fit a source of `natural` size and `orientation` onto `target`
///
/// The result always covers the whole target; the excess in at most one
/// axis is cropped evenly from both sides.
pub fn compute_transform(natural: FrameSize, orientation: Orientation, target: FrameSize) -> RenderPlan {
    let effective = orientation.apply_to(natural);
    let (ew, eh) = (f64::from(effective.width), f64::from(effective.height));
    let (tw, th) = (f64::from(target.width), f64::from(target.height));

    // Compare ew/eh with tw/th without dividing
    let source_wider = ew * th > eh * tw;
    let (scale, offset_x, offset_y) = if source_wider {
        let s = th / eh;
        (s, (ew * s - tw) / 2.0, 0.0)
    } else {
        let s = tw / ew;
        (s, 0.0, (eh * s - th) / 2.0)
    };

    let upright_mirrored = orientation
        .transform(natural)
        .then(Affine::mirror(ew));
    let transform = upright_mirrored
        .then(Affine::scale(scale, scale))
        .then(Affine::translation(-offset_x, -offset_y));

    let scaled = FrameSize::new(
        ((ew * scale).round() as u32).max(target.width),
        ((eh * scale).round() as u32).max(target.height),
    );
    let excess_w = scaled.width - target.width;
    let excess_h = scaled.height - target.height;
    let crop = Crop {
        left: excess_w / 2,
        right: excess_w - excess_w / 2,
        top: excess_h / 2,
        bottom: excess_h - excess_h / 2,
    };

    RenderPlan {
        transform,
        flip: FlipMethod::from_affine(&upright_mirrored),
        effective,
        scaled,
        crop,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn story() -> FrameSize {
        FrameSize::new(1080, 1920)
    }

    fn bounds(plan: &RenderPlan, natural: FrameSize) -> (f64, f64, f64, f64) {
        let (w, h) = (f64::from(natural.width), f64::from(natural.height));
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
            .map(|(x, y)| plan.transform.apply(x, y));
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        (min_x, max_x, min_y, max_y)
    }

    #[test]
    fn test_rotated_landscape_matches_story_exactly() {
        let natural = FrameSize::new(1920, 1080);
        let plan = compute_transform(natural, Orientation::rotated(90), story());

        assert_eq!(plan.effective, story());
        assert!((plan.scale() - 1.0).abs() < EPS);
        assert_eq!(plan.scaled, story());
        assert_eq!(plan.crop, Crop::default());
        // Rotation followed by the mirror leaves a pure transpose
        assert_eq!(plan.flip, FlipMethod::UpperLeftDiagonal);
        assert_eq!(plan.transform.tx, 0.0);
        assert_eq!(plan.transform.ty, 0.0);
    }

    #[test]
    fn test_portrait_source_is_only_mirrored() {
        let plan = compute_transform(story(), Orientation::UPRIGHT, story());
        assert_eq!(plan.flip, FlipMethod::Horizontal);
        assert_eq!(plan.transform, Affine::mirror(1080.0));
        assert_eq!(plan.crop, Crop::default());
    }

    #[test]
    fn test_landscape_source_crops_horizontally() {
        let natural = FrameSize::new(1920, 1080);
        let plan = compute_transform(natural, Orientation::UPRIGHT, story());

        let scale = 1920.0 / 1080.0;
        assert!((plan.scale() - scale).abs() < EPS);
        assert_eq!(plan.scaled.height, 1920);
        assert_eq!(plan.scaled.width, 3413);
        assert_eq!(plan.crop.top + plan.crop.bottom, 0);
        assert_eq!(plan.crop.left + plan.crop.right, 3413 - 1080);
        assert!(plan.crop.left.abs_diff(plan.crop.right) <= 1);
    }

    #[test]
    fn test_landscape_crop_offset() {
        let plan = compute_transform(FrameSize::new(1920, 1080), Orientation::UPRIGHT, story());

        assert_eq!(plan.crop, Crop { left: 1166, right: 1167, top: 0, bottom: 0 });
        assert!((plan.transform.tx - 6740.0 / 3.0).abs() < EPS);
        assert!(plan.transform.ty.abs() < EPS);

        let (cx, cy) = plan.transform.apply(960.0, 540.0);
        assert!((cx - 540.0).abs() < EPS);
        assert!((cy - 960.0).abs() < EPS);
    }

    #[test]
    fn test_tall_source_crops_vertically() {
        let natural = FrameSize::new(720, 1600);
        let plan = compute_transform(natural, Orientation::UPRIGHT, story());

        assert!((plan.scale() - 1.5).abs() < EPS);
        assert_eq!(plan.scaled, FrameSize::new(1080, 2400));
        assert_eq!(plan.crop, Crop { left: 0, right: 0, top: 240, bottom: 240 });
        assert!((plan.transform.ty + 240.0).abs() < EPS);
    }

    #[test]
    fn test_transform_covers_target_without_letterboxing() {
        let sources = [
            (1920, 1080, 0),
            (1280, 720, 0),
            (640, 480, 0),
            (1920, 1080, 90),
            (1920, 1080, 270),
            (1080, 1920, 180),
            (720, 1600, 0),
            (1000, 1000, 0),
            (4032, 3024, 90),
        ];
        let (tw, th) = (1080.0, 1920.0);
        for (w, h, degrees) in sources {
            let natural = FrameSize::new(w, h);
            let plan = compute_transform(natural, Orientation::rotated(degrees), story());
            let (min_x, max_x, min_y, max_y) = bounds(&plan, natural);

            assert!(min_x <= EPS && max_x >= tw - EPS, "{}x{}@{} x-axis", w, h, degrees);
            assert!(min_y <= EPS && max_y >= th - EPS, "{}x{}@{} y-axis", w, h, degrees);

            let bleed_x = min_x.abs() < EPS && (max_x - tw).abs() < EPS;
            let bleed_y = min_y.abs() < EPS && (max_y - th).abs() < EPS;
            assert!(bleed_x || bleed_y, "{}x{}@{} not full-bleed", w, h, degrees);

            // Crop is centred
            let left_excess = -min_x;
            let right_excess = max_x - tw;
            assert!((left_excess - right_excess).abs() < EPS);
        }
    }

    #[test]
    fn test_mirror_reverses_horizontal_order() {
        let natural = FrameSize::new(1080, 1920);
        let plan = compute_transform(natural, Orientation::UPRIGHT, story());
        let (left, _) = plan.transform.apply(0.0, 0.0);
        let (right, _) = plan.transform.apply(1080.0, 0.0);
        assert!(left > right);
    }

    #[test]
    fn test_orientation_tags() {
        assert_eq!(Orientation::from_tag("rotate-0"), Orientation::UPRIGHT);
        assert_eq!(Orientation::from_tag("rotate-90"), Orientation::rotated(90));
        assert_eq!(Orientation::from_tag("rotate-270").quarter_turns, 3);
        let flipped = Orientation::from_tag("flip-rotate-180");
        assert!(flipped.flipped);
        assert_eq!(flipped.quarter_turns, 2);
        assert_eq!(Orientation::from_tag("sideways"), Orientation::UPRIGHT);
        assert_eq!(Orientation::from_tag("rotate-45"), Orientation::UPRIGHT);
    }

    #[test]
    fn test_orientation_maps_into_upright_frame() {
        let natural = FrameSize::new(1920, 1080);
        for degrees in [0, 90, 180, 270] {
            let orientation = Orientation::rotated(degrees);
            let upright = orientation.apply_to(natural);
            let m = orientation.transform(natural);
            for (x, y) in [(0.0, 0.0), (1920.0, 0.0), (0.0, 1080.0), (1920.0, 1080.0)] {
                let (ux, uy) = m.apply(x, y);
                assert!(ux >= -EPS && ux <= f64::from(upright.width) + EPS);
                assert!(uy >= -EPS && uy <= f64::from(upright.height) + EPS);
            }
        }
    }

    #[test]
    fn test_flip_method_for_each_rotation() {
        let natural = FrameSize::new(1920, 1080);
        let flip_of = |degrees| compute_transform(natural, Orientation::rotated(degrees), story()).flip;
        assert_eq!(flip_of(0), FlipMethod::Horizontal);
        assert_eq!(flip_of(90), FlipMethod::UpperLeftDiagonal);
        assert_eq!(flip_of(180), FlipMethod::Vertical);
        assert_eq!(flip_of(270), FlipMethod::UpperRightDiagonal);
        assert_eq!(FlipMethod::UpperRightDiagonal.nick(), "ur-ll");
    }
}
