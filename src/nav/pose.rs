//! Camera Pose Helpers
//!
//! Conversions between quaternion camera orientation and the discrete
//! view-index grid. Simulator adapters that report orientation as a
//! quaternion use these to populate [`SimView::view_index`].
//!
//! [`SimView::view_index`]: crate::types::SimView

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::NavResult;
use crate::types::{ViewIndex, HEADING_BINS};

/// Convert a `(w, x, y, z)` quaternion to `(roll, pitch, yaw)` radians.
///
/// Roll and yaw are normalized to `[0, 2*pi)`; pitch is clamped to
/// `[-pi/2, pi/2]`.
pub fn quaternion_to_euler(q: (f64, f64, f64, f64)) -> (f64, f64, f64) {
    let (w, x, y, z) = q;

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    // Rounding can push the sine argument just past 1 for gimbal-lock poses.
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    let roll = (roll + 2.0 * PI) % (2.0 * PI);
    let yaw = (yaw + 2.0 * PI) % (2.0 * PI);
    let pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);

    (roll, pitch, yaw)
}

/// Snap a continuous camera pose to the discrete view grid.
///
/// Heading is binned clockwise into 12 slots of 30 degrees, centered on the
/// bin headings; elevation maps to the three levels at -30, 0, and +30
/// degrees, saturating beyond them.
pub fn view_index_from_pose(heading_rad: f64, elevation_rad: f64) -> NavResult<ViewIndex> {
    let heading_deg = heading_rad.to_degrees().rem_euclid(360.0);
    let bin = ((heading_deg / 30.0).round() as i64).rem_euclid(HEADING_BINS as i64) as u8;

    let elevation_deg = elevation_rad.to_degrees();
    let level = ((elevation_deg / 30.0).round() as i64 + 1).clamp(0, 2) as u8;

    ViewIndex::from_parts(level, bin)
}

/// View index for a camera whose orientation is a `(w, x, y, z)` quaternion,
/// using yaw as heading and pitch as elevation.
pub fn view_index_from_quaternion(q: (f64, f64, f64, f64)) -> NavResult<ViewIndex> {
    let (_roll, pitch, yaw) = quaternion_to_euler(q);
    view_index_from_pose(yaw, pitch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn identity_quaternion_has_zero_angles() {
        let (roll, pitch, yaw) = quaternion_to_euler((1.0, 0.0, 0.0, 0.0));
        assert!(roll.abs() < EPS);
        assert!(pitch.abs() < EPS);
        assert!(yaw.abs() < EPS);
    }

    #[test]
    fn pitch_saturates_at_the_gimbal_lock_pose() {
        // Exact 90-degree rotation about Y.
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let (_, pitch, _) = quaternion_to_euler((h, 0.0, h, 0.0));
        assert!((pitch - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn roll_and_yaw_are_normalized() {
        // Small negative yaw: rotation about Z by -0.2 rad.
        let half = -0.1f64;
        let q = (half.cos(), 0.0, 0.0, half.sin());
        let (_, _, yaw) = quaternion_to_euler(q);
        assert!(yaw >= 0.0 && yaw < 2.0 * PI);
        assert!((yaw - (2.0 * PI - 0.2)).abs() < 1e-6);
    }

    #[test]
    fn level_pose_lands_on_the_horizon_row() {
        let v = view_index_from_pose(0.0, 0.0).unwrap();
        assert_eq!(v.index(), 12);
        assert_eq!(v.level(), 1);
        assert_eq!(v.heading_bin(), 0);
    }

    #[test]
    fn heading_snaps_to_the_nearest_bin() {
        let v = view_index_from_pose(95f64.to_radians(), 0.0).unwrap();
        assert_eq!(v.heading_bin(), 3);

        // 345 degrees and beyond rounds forward into bin 0.
        let v = view_index_from_pose(350f64.to_radians(), 0.0).unwrap();
        assert_eq!(v.heading_bin(), 0);
    }

    #[test]
    fn elevation_saturates_at_the_outer_levels() {
        let up = view_index_from_pose(0.0, 80f64.to_radians()).unwrap();
        assert_eq!(up.level(), 2);

        let down = view_index_from_pose(0.0, (-80f64).to_radians()).unwrap();
        assert_eq!(down.level(), 0);
    }
}
