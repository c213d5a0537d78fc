// Copyright (c) 2024 Stagecraft Systems
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Pure easing functions mapping progress in `[0, 1]` to eased progress.
//!
//! Every implementation here is a plain function of `t`; none of them touch
//! state, so they may be shared freely between fades running concurrently.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// The set of easing curves the fade engine understands.
///
/// Unknown names (e.g. read back from a collaborator's persisted cue) degrade
/// to [`EasingKind::Linear`] rather than erroring, per the specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EasingKind {
    Linear,
    EaseInOutCubic,
    EaseInOutSine,
    EaseOutExponential,
    EaseBezier,
    SCurve,
}

impl Default for EasingKind {
    fn default() -> Self {
        EasingKind::EaseInOutSine
    }
}

impl EasingKind {
    /// Parse an easing kind by name, falling back to [`EasingKind::Linear`]
    /// for anything unrecognised.
    pub fn from_name(name: &str) -> EasingKind {
        match name.to_ascii_uppercase().as_str() {
            "LINEAR" => EasingKind::Linear,
            "EASE_IN_OUT_CUBIC" => EasingKind::EaseInOutCubic,
            "EASE_IN_OUT_SINE" => EasingKind::EaseInOutSine,
            "EASE_OUT_EXPONENTIAL" => EasingKind::EaseOutExponential,
            "EASE_BEZIER" => EasingKind::EaseBezier,
            "S_CURVE" => EasingKind::SCurve,
            _ => EasingKind::Linear,
        }
    }

    /// Apply this curve to a progress value, clamping the input to `[0, 1]`
    /// first so callers never have to guard against tick jitter.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingKind::Linear => linear(t),
            EasingKind::EaseInOutCubic => ease_in_out_cubic(t),
            EasingKind::EaseInOutSine => ease_in_out_sine(t),
            EasingKind::EaseOutExponential => ease_out_exponential(t),
            EasingKind::EaseBezier => ease_bezier(t),
            EasingKind::SCurve => s_curve(t),
        }
    }
}

fn linear(t: f64) -> f64 {
    t
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn ease_in_out_sine(t: f64) -> f64 {
    -((PI * t).cos() - 1.0) / 2.0
}

fn ease_out_exponential(t: f64) -> f64 {
    if t >= 1.0 {
        1.0
    } else {
        1.0 - 2f64.powf(-10.0 * t)
    }
}

/// A cubic-bezier approximation with control points (0.42, 0, 0.58, 1), solved
/// numerically for the `y` at parametric `x == t` via bisection on `x(s)`.
fn ease_bezier(t: f64) -> f64 {
    const P1X: f64 = 0.42;
    const P2X: f64 = 0.58;

    let bezier = |s: f64, p1: f64, p2: f64| -> f64 {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
    };

    // Bisect for the parameter `s` such that x(s) == t.
    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut s = t;
    for _ in 0..32 {
        let x = bezier(s, P1X, P2X);
        if (x - t).abs() < 1e-7 {
            break;
        }
        if x < t {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) / 2.0;
    }

    bezier(s, 0.0, 1.0)
}

fn s_curve(t: f64) -> f64 {
    1.0 / (1.0 + (-10.0 * (t - 0.5)).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_hold_for_every_curve() {
        for kind in [
            EasingKind::Linear,
            EasingKind::EaseInOutCubic,
            EasingKind::EaseInOutSine,
            EasingKind::EaseOutExponential,
            EasingKind::EaseBezier,
        ] {
            assert!((kind.apply(0.0) - 0.0).abs() < 1e-6, "{kind:?} f(0)");
            assert!((kind.apply(1.0) - 1.0).abs() < 1e-6, "{kind:?} f(1)");
        }
    }

    #[test]
    fn unknown_name_degrades_to_linear() {
        assert_eq!(EasingKind::from_name("not-a-real-curve"), EasingKind::Linear);
        assert_eq!(EasingKind::from_name("linear"), EasingKind::Linear);
        assert_eq!(
            EasingKind::from_name("ease_in_out_sine"),
            EasingKind::EaseInOutSine
        );
    }

    #[test]
    fn monotonic_curves_stay_within_unit_range() {
        let mut t = 0.0;
        while t <= 1.0 {
            for kind in [
                EasingKind::Linear,
                EasingKind::EaseInOutCubic,
                EasingKind::EaseInOutSine,
                EasingKind::EaseOutExponential,
            ] {
                let value = kind.apply(t);
                assert!((0.0..=1.0).contains(&value), "{kind:?} at {t} gave {value}");
            }
            t += 0.05;
        }
    }

    #[test]
    fn s_curve_is_centered() {
        assert!((s_curve(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clamps_out_of_range_progress() {
        assert_eq!(EasingKind::Linear.apply(-1.0), 0.0);
        assert_eq!(EasingKind::Linear.apply(2.0), 1.0);
    }
}
