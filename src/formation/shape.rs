// src/formation/shape.rs
//! Preset formation shapes as ordered lists of 2D slot offsets.
//!
//! Offsets are relative to the leader: `x` is lateral (positive = right) and
//! `y` is the distance along the direction of travel, so `y <= 0` always.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::error::FormationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    SingleFile,
    /// parameter = wedge angle in degrees
    Wedge,
    Circle,
    /// parameter = side length in followers
    Square,
    /// Reserved; building it fails.
    Triangle,
    /// parameter = number of parallel columns
    Lines,
    /// parameter = rhomb angle in degrees
    Rhomb,
    /// parameter = number of wave repeats
    Snake,
}

/// Shape kind plus the numbers that size it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpec {
    pub kind: ShapeKind,
    /// Distance between neighbouring slots (and between leader and first row).
    pub spacing: f32,
    /// Shape-specific; see `ShapeKind`.
    #[serde(default)]
    pub parameter: u32,
}

impl ShapeSpec {
    pub const fn new(kind: ShapeKind, spacing: f32, parameter: u32) -> Self {
        Self { kind, spacing, parameter }
    }
}

/// Post-pass that roughens a shape so it looks less drilled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JitterSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_jitter_strength")]
    pub strength: f32,
}

fn default_jitter_strength() -> f32 {
    0.2
}

impl Default for JitterSettings {
    fn default() -> Self {
        Self { enabled: false, strength: default_jitter_strength() }
    }
}

// ---------- Builder ----------

/// Offsets for `count` followers. Square shapes may return fewer than `count`
/// slots; callers must not assign the extra followers.
pub fn build_offsets(spec: &ShapeSpec, count: usize) -> Result<Vec<Vec2>, FormationError> {
    if !(spec.spacing.is_finite() && spec.spacing > 0.0) {
        return Err(FormationError::NonPositiveSpacing(spec.spacing));
    }
    let spacing = spec.spacing;
    let param = spec.parameter;

    let offsets = match spec.kind {
        ShapeKind::SingleFile => (0..count)
            .map(|i| Vec2::new(0.0, -spacing * (i + 1) as f32))
            .collect(),

        ShapeKind::Wedge => {
            if param == 0 {
                return Err(FormationError::ZeroAngle { shape: spec.kind });
            }
            let (opposite, adjacent) = angle_legs(param, spacing);
            (0..count)
                .map(|i| {
                    let row = (1 + i / 2) as f32;
                    Vec2::new(side_of(i) * opposite * row, -row * adjacent)
                })
                .collect()
        }

        ShapeKind::Circle => {
            let sectors = (count + 1) as f32;
            let radius = sectors * spacing / PI;
            (0..count)
                .map(|i| {
                    let angle = (i + 1) as f32 * TAU / sectors;
                    Vec2::new(radius * angle.sin(), -radius + radius * angle.cos())
                })
                .collect()
        }

        ShapeKind::Lines => {
            if param == 0 {
                return Err(FormationError::ZeroParameter { shape: spec.kind });
            }
            columns(count, param, spacing)
        }

        ShapeKind::Square => {
            if param == 0 {
                return Err(FormationError::ZeroParameter { shape: spec.kind });
            }
            let capacity = (param as usize) * (param as usize);
            if count < capacity {
                warn!("Formation: {} followers cannot fill a {}x{} square", count, param, param);
            }
            if count > capacity {
                warn!(
                    "Formation: {} followers exceed a {}x{} square; {} left without a slot",
                    count,
                    param,
                    param,
                    count - capacity
                );
            }
            columns(count.min(capacity), param, spacing)
        }

        // zero repeats is a straight file
        ShapeKind::Snake => {
            let n = count as f32;
            (0..count)
                .map(|i| {
                    let y = spacing * (i + 1) as f32;
                    let x = spacing * (TAU * param as f32 * (y / n)).sin();
                    Vec2::new(x, -y)
                })
                .collect()
        }

        ShapeKind::Rhomb => {
            if param == 0 {
                return Err(FormationError::ZeroAngle { shape: spec.kind });
            }
            if count % 2 == 0 {
                warn!("Formation: rhomb expects an odd follower count, got {}", count);
            }
            let (opposite, adjacent) = angle_legs(param, spacing);
            let max_rows = ((count + 1) / 4) as f32;
            let half = count / 2;
            (0..count)
                .map(|i| {
                    let row = (1 + i / 2) as f32;
                    // diverging half widens per row, converging half folds back in
                    let lateral = if i > half { max_rows - (row - max_rows) } else { row };
                    Vec2::new(side_of(i) * opposite * lateral, -row * adjacent)
                })
                .collect()
        }

        ShapeKind::Triangle => return Err(FormationError::UnsupportedShape(spec.kind)),
    };

    check_behind_leader(&offsets)?;
    Ok(offsets)
}

/// Errors on the first slot that would sit ahead of the leader.
pub fn check_behind_leader(offsets: &[Vec2]) -> Result<(), FormationError> {
    match offsets.iter().position(|o| o.y > 0.0) {
        Some(slot) => Err(FormationError::PositiveOffset { slot, y: offsets[slot].y }),
        None => Ok(()),
    }
}

/// Deepest (most negative) `y` over all offsets, 0 for an empty list.
pub fn deepest_offset(offsets: impl IntoIterator<Item = Vec2>) -> f32 {
    offsets.into_iter().fold(0.0, |deepest, o| deepest.min(o.y))
}

// ---------- Jitter ----------

/// Pushes every slot back by up to `strength` and sideways by up to
/// `±strength`. Deterministic per (seed, slot); `y` only ever decreases.
pub fn apply_jitter(offsets: &mut [Vec2], settings: &JitterSettings, seed: u64) {
    if !settings.enabled || settings.strength <= 0.0 {
        return;
    }
    let s = settings.strength;
    for (slot, offset) in offsets.iter_mut().enumerate() {
        let mut rng = rng_for_slot(seed, slot);
        offset.y -= rng.random::<f32>() * s;
        offset.x -= (rng.random::<f32>() * 2.0 - 1.0) * s;
    }
}

#[inline]
fn rng_for_slot(seed: u64, slot: usize) -> ChaCha8Rng {
    let mix = seed ^ ((slot as u64) << 24) ^ 0x5EED_F0A7_10B5_0001u64;
    ChaCha8Rng::seed_from_u64(mix)
}

// ---------- Helpers ----------

/// (opposite, adjacent) legs of a triangle with hypotenuse `spacing`.
fn angle_legs(degrees: u32, spacing: f32) -> (f32, f32) {
    let beta = (degrees as f32).to_radians();
    (spacing * beta.sin(), spacing * beta.cos())
}

/// +1 for even slots, -1 for odd.
#[inline]
fn side_of(i: usize) -> f32 {
    if i % 2 == 0 { 1.0 } else { -1.0 }
}

/// Row-major grid, centred with truncated integer half-width.
fn columns(count: usize, cols: u32, spacing: f32) -> Vec<Vec2> {
    let cols = cols as usize;
    let half = ((cols - 1) / 2) as f32;
    (0..count)
        .map(|i| {
            let row = (i / cols) as f32;
            let col = (i % cols) as f32;
            Vec2::new((col - half) * spacing, -(row + 1.0) * spacing)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < EPS
    }

    #[test]
    fn single_file_trails_straight_back() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::SingleFile, 1.5, 0), 4).unwrap();
        let expected = [-1.5, -3.0, -4.5, -6.0];
        assert_eq!(offsets.len(), 4);
        for (o, y) in offsets.iter().zip(expected) {
            assert!(approx(*o, Vec2::new(0.0, y)));
        }
    }

    #[test]
    fn wedge_alternates_sides_every_row() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Wedge, 1.0, 30), 4).unwrap();
        let (s, c) = (30f32.to_radians().sin(), 30f32.to_radians().cos());
        assert!(approx(offsets[0], Vec2::new(s, -c)));
        assert!(approx(offsets[1], Vec2::new(-s, -c)));
        assert!(approx(offsets[2], Vec2::new(2.0 * s, -2.0 * c)));
        assert!(approx(offsets[3], Vec2::new(-2.0 * s, -2.0 * c)));
    }

    #[test]
    fn circle_closes_behind_the_leader() {
        let n = 5;
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Circle, 2.0, 0), n).unwrap();
        let radius = 6.0 * 2.0 / PI;
        let centre = Vec2::new(0.0, -radius);
        for o in &offsets {
            assert!((o.distance(centre) - radius).abs() < 1e-4);
        }
        // the middle slot is the far side of the circle
        assert!(approx(offsets[2], Vec2::new(0.0, -2.0 * radius)));
    }

    #[test]
    fn lines_use_truncated_half_width() {
        // cols = 2 -> half = 0, so columns sit at x = 0 and x = spacing
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Lines, 1.0, 2), 4).unwrap();
        assert!(approx(offsets[0], Vec2::new(0.0, -1.0)));
        assert!(approx(offsets[1], Vec2::new(1.0, -1.0)));
        assert!(approx(offsets[2], Vec2::new(0.0, -2.0)));
        assert!(approx(offsets[3], Vec2::new(1.0, -2.0)));

        let three = build_offsets(&ShapeSpec::new(ShapeKind::Lines, 1.0, 3), 3).unwrap();
        assert!(approx(three[0], Vec2::new(-1.0, -1.0)));
        assert!(approx(three[2], Vec2::new(1.0, -1.0)));
    }

    #[test]
    fn square_clips_excess_followers() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Square, 1.0, 2), 7).unwrap();
        assert_eq!(offsets.len(), 4);
        let short = build_offsets(&ShapeSpec::new(ShapeKind::Square, 1.0, 3), 5).unwrap();
        assert_eq!(short.len(), 5);
    }

    #[test]
    fn snake_weaves_sideways() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Snake, 1.0, 1), 4).unwrap();
        // y = 1, 2, 3, 4 ; x = sin(2*pi*y/4)
        assert!(approx(offsets[0], Vec2::new(1.0, -1.0)));
        assert!(approx(offsets[1], Vec2::new(0.0, -2.0)));
        assert!(approx(offsets[2], Vec2::new(-1.0, -3.0)));
        assert!(approx(offsets[3], Vec2::new(0.0, -4.0)));
    }

    #[test]
    fn snake_without_repeats_is_a_file() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Snake, 1.5, 0), 3).unwrap();
        assert_eq!(offsets, vec![Vec2::new(0.0, -1.5), Vec2::new(0.0, -3.0), Vec2::new(0.0, -4.5)]);
    }

    #[test]
    fn rhomb_converges_after_the_midpoint() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Rhomb, 1.0, 45), 7).unwrap();
        let (s, c) = (45f32.to_radians().sin(), 45f32.to_radians().cos());
        // max_rows = 2, half = 3 ; slots 0..=3 diverge, 4..=6 converge
        assert!(approx(offsets[3], Vec2::new(-2.0 * s, -2.0 * c)));
        assert!(approx(offsets[4], Vec2::new(1.0 * s, -3.0 * c)));
        assert!(approx(offsets[5], Vec2::new(-1.0 * s, -3.0 * c)));
        assert!(approx(offsets[6], Vec2::new(0.0, -4.0 * c)));
    }

    #[test]
    fn every_shape_stays_behind_the_leader() {
        let specs = [
            ShapeSpec::new(ShapeKind::SingleFile, 2.0, 0),
            ShapeSpec::new(ShapeKind::Wedge, 2.0, 60),
            ShapeSpec::new(ShapeKind::Circle, 2.0, 0),
            ShapeSpec::new(ShapeKind::Lines, 2.0, 3),
            ShapeSpec::new(ShapeKind::Square, 2.0, 3),
            ShapeSpec::new(ShapeKind::Snake, 2.0, 2),
            ShapeSpec::new(ShapeKind::Rhomb, 2.0, 30),
        ];
        for spec in specs {
            for n in [1usize, 2, 7, 12] {
                let offsets = build_offsets(&spec, n).unwrap();
                assert!(offsets.iter().all(|o| o.y <= 0.0), "{:?} n={}", spec.kind, n);
            }
        }
    }

    #[test]
    fn configuration_errors() {
        assert_eq!(
            build_offsets(&ShapeSpec::new(ShapeKind::Wedge, 1.0, 0), 3),
            Err(FormationError::ZeroAngle { shape: ShapeKind::Wedge })
        );
        assert_eq!(
            build_offsets(&ShapeSpec::new(ShapeKind::Rhomb, 1.0, 0), 3),
            Err(FormationError::ZeroAngle { shape: ShapeKind::Rhomb })
        );
        assert_eq!(
            build_offsets(&ShapeSpec::new(ShapeKind::Triangle, 1.0, 3), 3),
            Err(FormationError::UnsupportedShape(ShapeKind::Triangle))
        );
        assert_eq!(
            build_offsets(&ShapeSpec::new(ShapeKind::Lines, 1.0, 0), 3),
            Err(FormationError::ZeroParameter { shape: ShapeKind::Lines })
        );
        assert!(matches!(
            build_offsets(&ShapeSpec::new(ShapeKind::SingleFile, 0.0, 0), 3),
            Err(FormationError::NonPositiveSpacing(_))
        ));
        // an obtuse wedge would put slots ahead of the leader
        assert!(matches!(
            build_offsets(&ShapeSpec::new(ShapeKind::Wedge, 1.0, 120), 2),
            Err(FormationError::PositiveOffset { slot: 0, .. })
        ));
    }

    #[test]
    fn jitter_is_bounded_and_reproducible() {
        let base = build_offsets(&ShapeSpec::new(ShapeKind::Lines, 1.0, 3), 9).unwrap();
        let settings = JitterSettings { enabled: true, strength: 0.3 };

        let mut a = base.clone();
        let mut b = base.clone();
        apply_jitter(&mut a, &settings, 42);
        apply_jitter(&mut b, &settings, 42);
        assert_eq!(a, b);

        for (j, o) in a.iter().zip(&base) {
            assert!(j.y <= o.y && j.y >= o.y - 0.3);
            assert!((j.x - o.x).abs() <= 0.3);
        }

        let mut off = base.clone();
        apply_jitter(&mut off, &JitterSettings::default(), 42);
        assert_eq!(off, base);
    }

    #[test]
    fn deepest_offset_is_most_negative_y() {
        let offsets = build_offsets(&ShapeSpec::new(ShapeKind::Wedge, 2.0, 30), 5).unwrap();
        let expected = -3.0 * 2.0 * 30f32.to_radians().cos();
        assert!((deepest_offset(offsets) - expected).abs() < EPS);
        assert_eq!(deepest_offset(Vec::<Vec2>::new()), 0.0);
    }
}
