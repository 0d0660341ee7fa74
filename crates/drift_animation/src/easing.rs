//! Easing curves for timing animations
//!
//! Every curve maps progress in `[0, 1]` to eased progress with `f(0) = 0` and
//! `f(1) = 1`. `Back` and `Elastic` leave the unit range in between.

use std::f64::consts::PI;

/// Easing curve
#[derive(Clone, Copy, Debug, Default)]
pub enum Easing {
    #[default]
    Linear,
    /// Cubic ease-in
    EaseIn,
    /// Cubic ease-out
    EaseOut,
    /// Cubic ease-in-out, the timing default
    EaseInOut,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    /// Pulls back before moving forward, by the given overshoot amount
    Back(f64),
    /// Spring-like wobble; higher bounciness oscillates more
    Elastic(f64),
    /// Bouncing ball settling at the end
    Bounce,
    /// CSS `cubic-bezier(x1, y1, x2, y2)`
    CubicBezier(f64, f64, f64, f64),
    Custom(fn(f64) -> f64),
}

impl Easing {
    /// Standard `Back` overshoot
    pub const BACK: Easing = Easing::Back(1.70158);

    /// Eased progress for `t` in `[0, 1]`
    pub fn apply(&self, t: f64) -> f64 {
        match *self {
            Easing::Linear => t,
            Easing::EaseIn | Easing::EaseInCubic => power_in(t, 3),
            Easing::EaseOut | Easing::EaseOutCubic => power_out(t, 3),
            Easing::EaseInOut | Easing::EaseInOutCubic => power_in_out(t, 3),
            Easing::EaseInQuad => power_in(t, 2),
            Easing::EaseOutQuad => power_out(t, 2),
            Easing::EaseInOutQuad => power_in_out(t, 2),
            Easing::EaseInQuart => power_in(t, 4),
            Easing::EaseOutQuart => power_out(t, 4),
            Easing::EaseInOutQuart => power_in_out(t, 4),
            Easing::Back(s) => t * t * ((s + 1.0) * t - s),
            Easing::Elastic(bounciness) => {
                1.0 - (t * PI / 2.0).cos().powi(3) * (t * bounciness * PI).cos()
            }
            Easing::Bounce => bounce(t),
            Easing::CubicBezier(x1, y1, x2, y2) => {
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else {
                    UnitBezier::new(x1, y1, x2, y2).solve(t)
                }
            }
            Easing::Custom(f) => f(t),
        }
    }
}

fn power_in(t: f64, n: i32) -> f64 {
    t.powi(n)
}

fn power_out(t: f64, n: i32) -> f64 {
    1.0 - (1.0 - t).powi(n)
}

fn power_in_out(t: f64, n: i32) -> f64 {
    if t < 0.5 {
        power_in(2.0 * t, n) / 2.0
    } else {
        1.0 - power_in(2.0 - 2.0 * t, n) / 2.0
    }
}

fn bounce(t: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;

    let (shift, floor) = if t < 1.0 / D {
        (0.0, 0.0)
    } else if t < 2.0 / D {
        (1.5, 0.75)
    } else if t < 2.5 / D {
        (2.25, 0.9375)
    } else {
        (2.625, 0.984375)
    };
    let t = t - shift / D;
    N * t * t + floor
}

/// Polynomial coefficients of a bezier with fixed endpoints `(0, 0)` and `(1, 1)`
struct UnitBezier {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl UnitBezier {
    const EPSILON: f64 = 1e-7;

    fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let cx = 3.0 * x1;
        let bx = 3.0 * (x2 - x1) - cx;
        let cy = 3.0 * y1;
        let by = 3.0 * (y2 - y1) - cy;
        Self {
            ax: 1.0 - cx - bx,
            bx,
            cx,
            ay: 1.0 - cy - by,
            by,
            cy,
        }
    }

    fn x_at(&self, p: f64) -> f64 {
        ((self.ax * p + self.bx) * p + self.cx) * p
    }

    fn y_at(&self, p: f64) -> f64 {
        ((self.ay * p + self.by) * p + self.cy) * p
    }

    fn dx_at(&self, p: f64) -> f64 {
        (3.0 * self.ax * p + 2.0 * self.bx) * p + self.cx
    }

    /// `y` at the parameter where the curve reaches `x`
    fn solve(&self, x: f64) -> f64 {
        self.y_at(self.parameter_for(x))
    }

    /// Newton iterations first; bisection when the slope flattens out
    fn parameter_for(&self, x: f64) -> f64 {
        let mut p = x;
        for _ in 0..8 {
            let error = self.x_at(p) - x;
            if error.abs() < Self::EPSILON {
                return p;
            }
            let slope = self.dx_at(p);
            if slope.abs() < Self::EPSILON {
                break;
            }
            p -= error / slope;
        }

        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        p = x;
        for _ in 0..32 {
            let current = self.x_at(p);
            if (current - x).abs() < Self::EPSILON {
                break;
            }
            if current < x {
                lo = p;
            } else {
                hi = p;
            }
            p = (lo + hi) / 2.0;
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let curves = [
            Easing::Linear,
            Easing::EaseInOut,
            Easing::EaseOutQuart,
            Easing::Bounce,
            Easing::CubicBezier(0.25, 0.1, 0.25, 1.0),
        ];
        for easing in curves {
            assert!(easing.apply(0.0).abs() < 1e-9, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let easing = Easing::EaseInOut;
        assert!((easing.apply(0.5) - 0.5).abs() < 1e-9);
        assert!((easing.apply(0.25) + easing.apply(0.75) - 1.0).abs() < 1e-9);
        assert!((easing.apply(0.25) - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn test_linear_bezier_is_identity() {
        let easing = Easing::CubicBezier(0.0, 0.0, 1.0, 1.0);
        for t in [0.1, 0.35, 0.8] {
            assert!((easing.apply(t) - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_back_dips_below_zero() {
        assert!(Easing::BACK.apply(0.2) < 0.0);
    }

    #[test]
    fn test_custom() {
        let easing = Easing::Custom(|t| t * t);
        assert_eq!(easing.apply(0.5), 0.25);
    }
}
