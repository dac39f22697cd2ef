//! Gain laws for crossfading
//!
//! Two places fade one signal into another:
//! - the seam blend between consecutive units, which always uses [`FadeCurve::EqualPower`]
//! - the timed volume crossfade between overlapping units, which uses the configured curve

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::str::FromStr;

/// Crossfade gain law
///
/// For progress `t` in `[0, 1]`, the incoming gain rises from 0.0 to 1.0 and
/// the outgoing gain falls from 1.0 to 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// `in = t`, `out = 1 - t`; summed power dips to 0.5 mid-fade
    Linear,

    /// `in = (1 - cos πt) / 2`, `out = (1 + cos πt) / 2`
    #[serde(alias = "cosine")]
    SCurve,

    /// `in = √t`, `out = √(1 - t)`
    ///
    /// `in² + out² = 1` at every `t`, so perceived loudness holds steady.
    #[default]
    EqualPower,
}

impl FadeCurve {
    /// Gain of the incoming signal at progress `t` (clamped to `[0, 1]`)
    pub fn fade_in(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => t.sqrt(),
        }
    }

    /// Gain of the outgoing signal at progress `t` (clamped to `[0, 1]`)
    pub fn fade_out(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (1.0 - t).sqrt(),
        }
    }

    /// Both gains at once: `(outgoing, incoming)`
    pub fn gains(&self, t: f32) -> (f32, f32) {
        (self.fade_out(t), self.fade_in(t))
    }

    /// Name used in config files and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::SCurve => "s_curve",
            FadeCurve::EqualPower => "equal_power",
        }
    }

    pub const ALL: [FadeCurve; 3] = [FadeCurve::Linear, FadeCurve::SCurve, FadeCurve::EqualPower];
}

/// Case-insensitive; accepts `-` or `_` separators and `cosine` for the S-curve
impl FromStr for FadeCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "s_curve" | "scurve" | "cosine" => Ok(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Ok(FadeCurve::EqualPower),
            other => Err(Error::InvalidInput(format!(
                "Unknown fade curve '{}' (expected linear, s_curve, or equal_power)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        for curve in FadeCurve::ALL {
            assert!(curve.fade_in(0.0).abs() < 1e-3, "{} fade-in start", curve);
            assert!((curve.fade_in(1.0) - 1.0).abs() < 1e-3, "{} fade-in end", curve);
            assert!((curve.fade_out(0.0) - 1.0).abs() < 1e-3, "{} fade-out start", curve);
            assert!(curve.fade_out(1.0).abs() < 1e-3, "{} fade-out end", curve);
        }
    }

    #[test]
    fn test_equal_power_keeps_total_power() {
        for step in 0..=100 {
            let t = step as f32 / 100.0;
            let (out, inc) = FadeCurve::EqualPower.gains(t);
            let power = out * out + inc * inc;
            assert!((power - 1.0).abs() < 1e-5, "t={} power={}", t, power);
        }
    }

    #[test]
    fn test_linear_dips_at_midpoint() {
        let (out, inc) = FadeCurve::Linear.gains(0.5);
        assert!(out * out + inc * inc < 0.51);
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(FadeCurve::EqualPower.fade_in(-1.0), 0.0);
        assert_eq!(FadeCurve::EqualPower.fade_in(2.0), 1.0);
        assert_eq!(FadeCurve::Linear.fade_out(7.5), 0.0);
    }

    #[test]
    fn test_parse() {
        assert_eq!("cosine".parse::<FadeCurve>().unwrap(), FadeCurve::SCurve);
        assert_eq!("S-Curve".parse::<FadeCurve>().unwrap(), FadeCurve::SCurve);
        assert_eq!("EQUAL_POWER".parse::<FadeCurve>().unwrap(), FadeCurve::EqualPower);
        assert_eq!("equal-power".parse::<FadeCurve>().unwrap(), FadeCurve::EqualPower);
        assert!(matches!(
            "exponential".parse::<FadeCurve>(),
            Err(Error::InvalidInput(_))
        ));
        for curve in FadeCurve::ALL {
            assert_eq!(curve.name().parse::<FadeCurve>().unwrap(), curve);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FadeCurve::EqualPower).unwrap();
        assert_eq!(json, "\"equal_power\"");
        let parsed: FadeCurve = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(parsed, FadeCurve::SCurve);
        assert_eq!(FadeCurve::default(), FadeCurve::EqualPower);
    }
}
