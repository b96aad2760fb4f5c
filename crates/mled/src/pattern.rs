//! Translation from user-facing pattern descriptions to the wire
//! [`PatternConfig`].
//!
//! Parameters arrive as loosely typed JSON values and are coerced
//! permissively: numeric strings parse as numbers, boolean-ish strings as
//! booleans, and anything missing or unusable falls back to the per-type
//! default. Every value is clamped to its field range before encoding.
//!
//! Data block layouts:
//!
//! | type      | bytes                                                                 |
//! |-----------|-----------------------------------------------------------------------|
//! | rainbow   | speed, saturation, spread_x10                                         |
//! | chase     | speed, tail_len, gap_len, trains, fg rgb, bg rgb, direction, fade_tail |
//! | breathing | speed, rgb, min_bri, max_bri, curve                                   |
//! | sparkle   | speed, rgb, density_pct, fade_speed, color_mode, bg rgb               |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::proto::{PatternConfig, PatternType};

const MAX_SPEED: i64 = 20;

const DIRECTIONS: &[(&str, u8)] = &[("forward", 0), ("reverse", 1), ("bounce", 2)];
const CURVES: &[(&str, u8)] = &[("sine", 0), ("linear", 1), ("ease", 2)];
const COLOR_MODES: &[(&str, u8)] = &[("fixed", 0), ("random", 1), ("rainbow", 2)];

const CURVE_SINE: u8 = 0;
const CURVE_LINEAR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern type '{0}' is not supported by the MLED/1 wire patterns")]
    Unsupported(String),
    #[error("unknown pattern type: {0:?}")]
    Unknown(String),
    #[error("invalid hex color: {0:?}")]
    InvalidColor(String),
}

/// User-facing pattern: a type name plus named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub brightness: i64,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PatternSpec {
    pub fn new(kind: impl Into<String>, brightness: i64) -> Self {
        Self {
            kind: kind.into(),
            brightness,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Stored preset as handed over by the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub config: PatternSpec,
}

impl Preset {
    pub fn to_wire(&self) -> Result<PatternConfig, PatternError> {
        build_wire_pattern(&self.config)
    }
}

pub fn build_wire_pattern(spec: &PatternSpec) -> Result<PatternConfig, PatternError> {
    let params = Params(&spec.params);
    let brightness = clamp_u8(spec.brightness, 0, 100);
    let mut out = PatternConfig {
        brightness_pct: brightness,
        ..Default::default()
    };

    match spec.kind.trim().to_ascii_lowercase().as_str() {
        "off" => {
            out.pattern_type = PatternType::Off;
        }
        "rainbow" => {
            out.pattern_type = PatternType::Rainbow;
            out.data[0] = clamp_u8(scale_speed(params.int("speed", 10)), 0, 20);
            out.data[1] = clamp_u8(params.int("saturation", 100), 0, 100);
            out.data[2] = clamp_u8(params.int("spread_x10", 10), 1, 50);
        }
        "chase" => {
            out.pattern_type = PatternType::Chase;
            let fg = params.color("fg_color", "#FFFFFF")?;
            let bg = params.color("bg_color", "#000000")?;
            out.data[0] = clamp_u8(params.int("speed", 30), 0, 255);
            out.data[1] = clamp_u8(params.int("tail_len", 5), 1, 255);
            out.data[2] = clamp_u8(params.int("gap_len", 10), 0, 255);
            out.data[3] = clamp_u8(params.int("trains", 1), 1, 255);
            out.data[4..7].copy_from_slice(&fg);
            out.data[7..10].copy_from_slice(&bg);
            out.data[10] = params.enumeration("direction", DIRECTIONS, 0);
            out.data[11] = u8::from(params.boolean("fade_tail", true));
        }
        "breathing" => {
            out.pattern_type = PatternType::Breathing;
            let rgb = params.color("color", "#FFFFFF")?;
            out.data[0] = clamp_u8(scale_speed(params.int("speed", 6)), 0, 20);
            out.data[1..4].copy_from_slice(&rgb);
            out.data[4] = clamp_u8(params.int("min_bri", 10), 0, 255);
            out.data[5] = clamp_u8(params.int("max_bri", i64::from(brightness)), 0, 255);
            out.data[6] = params.enumeration("curve", CURVES, CURVE_SINE);
        }
        "sparkle" => {
            out.pattern_type = PatternType::Sparkle;
            let rgb = params.color("color", "#FFFFFF")?;
            let bg = params.color("bg_color", "#000000")?;
            out.data[0] = clamp_u8(scale_speed(params.int("speed", 10)), 0, 20);
            out.data[1..4].copy_from_slice(&rgb);
            out.data[4] = clamp_u8(params.int("density_pct", 30), 0, 100);
            out.data[5] = clamp_u8(params.int("fade_speed", 50), 1, 255);
            out.data[6] = params.enumeration("color_mode", COLOR_MODES, 0);
            out.data[7..10].copy_from_slice(&bg);
        }
        // Legacy: constant color, expressed as a flat breathing curve.
        "solid" => {
            out.pattern_type = PatternType::Breathing;
            let rgb = params.color("color", "#FFFFFF")?;
            out.data[0] = 0;
            out.data[1..4].copy_from_slice(&rgb);
            out.data[4] = brightness;
            out.data[5] = brightness;
            out.data[6] = CURVE_LINEAR;
        }
        // Legacy: 0..100 speed, full-depth sine breathing.
        "pulse" => {
            out.pattern_type = PatternType::Breathing;
            let rgb = params.color("color", "#FFFFFF")?;
            out.data[0] = clamp_u8(params.int("speed", 50).saturating_mul(MAX_SPEED) / 100, 0, 20);
            out.data[1..4].copy_from_slice(&rgb);
            out.data[4] = 0;
            out.data[5] = brightness;
            out.data[6] = CURVE_SINE;
        }
        "gradient" => return Err(PatternError::Unsupported(spec.kind.clone())),
        _ => return Err(PatternError::Unknown(spec.kind.clone())),
    }

    Ok(out)
}

/// Parses `#RRGGBB` (the `#` is optional).
pub fn parse_hex_color(value: &str) -> Result<[u8; 3], PatternError> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let invalid = || PatternError::InvalidColor(value.to_string());

    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |at: usize| u8::from_str_radix(&hex[at..at + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

// Older presets use a 0..100 speed scale.
fn scale_speed(speed: i64) -> i64 {
    if speed > MAX_SPEED {
        speed.saturating_mul(MAX_SPEED) / 100
    } else {
        speed
    }
}

fn clamp_u8(value: i64, lo: u8, hi: u8) -> u8 {
    value.clamp(i64::from(lo), i64::from(hi)) as u8
}

struct Params<'a>(&'a Map<String, Value>);

impl Params<'_> {
    fn int(&self, key: &str, default: i64) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(default),
            Some(Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                    .unwrap_or(default)
            }
            _ => default,
        }
    }

    fn boolean(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map_or(default, |f| f != 0.0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => default,
            },
            _ => default,
        }
    }

    fn enumeration(&self, key: &str, names: &[(&str, u8)], default: u8) -> u8 {
        match self.0.get(key) {
            Some(Value::String(s)) => {
                let wanted = s.trim().to_ascii_lowercase();
                names
                    .iter()
                    .find(|(name, _)| *name == wanted)
                    .map_or(default, |&(_, value)| value)
            }
            Some(Value::Number(_)) => clamp_u8(self.int(key, i64::from(default)), 0, 255),
            _ => default,
        }
    }

    fn color(&self, key: &str, default: &str) -> Result<[u8; 3], PatternError> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.is_empty() => parse_hex_color(s),
            _ => parse_hex_color(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_solid_maps_to_flat_breathing() {
        let spec = PatternSpec::new("solid", 30).with_param("color", "#FF00FF");
        let wire = build_wire_pattern(&spec).unwrap();

        assert_eq!(wire.pattern_type, PatternType::Breathing);
        assert_eq!(wire.brightness_pct, 30);
        assert_eq!(&wire.data[..7], &[0, 255, 0, 255, 30, 30, 1]);
        assert_eq!(&wire.data[7..], &[0; 5]);
    }

    #[test]
    fn test_pulse_scales_speed() {
        let spec = PatternSpec::new("Pulse", 70).with_param("speed", 50);
        let wire = build_wire_pattern(&spec).unwrap();

        assert_eq!(wire.pattern_type, PatternType::Breathing);
        assert_eq!(wire.data[0], 10);
        assert_eq!(wire.data[4], 0);
        assert_eq!(wire.data[5], 70);
        assert_eq!(wire.data[6], 0);

        let fast = PatternSpec::new("pulse", 70).with_param("speed", 400);
        assert_eq!(build_wire_pattern(&fast).unwrap().data[0], 20);
    }

    #[test]
    fn test_gradient_is_unsupported() {
        let spec = PatternSpec::new("gradient", 50).with_param("color", "#00FF00");
        assert_eq!(
            build_wire_pattern(&spec),
            Err(PatternError::Unsupported("gradient".to_string()))
        );
        assert!(matches!(
            build_wire_pattern(&PatternSpec::new("strobe", 50)),
            Err(PatternError::Unknown(_))
        ));
    }

    #[test]
    fn test_brightness_clamped() {
        let high = build_wire_pattern(&PatternSpec::new("off", 250)).unwrap();
        assert_eq!(high.brightness_pct, 100);
        assert_eq!(high.pattern_type, PatternType::Off);

        let low = build_wire_pattern(&PatternSpec::new("rainbow", -5)).unwrap();
        assert_eq!(low.brightness_pct, 0);
    }

    #[test]
    fn test_rainbow_defaults_and_legacy_speed() {
        let wire = build_wire_pattern(&PatternSpec::new("rainbow", 60)).unwrap();
        assert_eq!(&wire.data[..3], &[10, 100, 10]);

        let legacy = PatternSpec::new("rainbow", 60)
            .with_param("speed", 75)
            .with_param("saturation", "40")
            .with_param("spread_x10", 0);
        let wire = build_wire_pattern(&legacy).unwrap();
        assert_eq!(&wire.data[..3], &[15, 40, 1]);
    }

    #[test]
    fn test_chase_full_layout() {
        let spec = PatternSpec::new("chase", 90)
            .with_param("speed", 40)
            .with_param("tail_len", "0")
            .with_param("trains", 3)
            .with_param("fg_color", "#102030")
            .with_param("bg_color", "#000001")
            .with_param("direction", " Bounce ")
            .with_param("fade_tail", "off");
        let wire = build_wire_pattern(&spec).unwrap();

        assert_eq!(wire.pattern_type, PatternType::Chase);
        assert_eq!(
            wire.data,
            [40, 1, 10, 3, 0x10, 0x20, 0x30, 0, 0, 1, 2, 0]
        );
    }

    #[test]
    fn test_breathing_params() {
        let spec = PatternSpec::new("breathing", 80)
            .with_param("speed", 12.9)
            .with_param("color", "00ff80")
            .with_param("min_bri", 5)
            .with_param("curve", "ease");
        let wire = build_wire_pattern(&spec).unwrap();

        assert_eq!(&wire.data[..7], &[12, 0, 255, 128, 5, 80, 2]);
    }

    #[test]
    fn test_sparkle_enum_from_number() {
        let spec = PatternSpec::new("sparkle", 40)
            .with_param("color_mode", 2)
            .with_param("density_pct", 150)
            .with_param("fade_speed", 0);
        let wire = build_wire_pattern(&spec).unwrap();

        assert_eq!(wire.data[4], 100);
        assert_eq!(wire.data[5], 1);
        assert_eq!(wire.data[6], 2);
        assert_eq!(&wire.data[7..10], &[0, 0, 0]);
    }

    #[test]
    fn test_invalid_color_fails() {
        let spec = PatternSpec::new("solid", 30).with_param("color", "#GG0000");
        assert!(matches!(
            build_wire_pattern(&spec),
            Err(PatternError::InvalidColor(_))
        ));
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#ÿÿÿ").is_err());
        assert!(parse_hex_color("+F+F+F").is_err());
        assert_eq!(parse_hex_color(" #0a0B0c ").unwrap(), [10, 11, 12]);
    }

    #[test]
    fn test_non_string_color_uses_default() {
        let spec = PatternSpec::new("solid", 10).with_param("color", json!(12));
        let wire = build_wire_pattern(&spec).unwrap();
        assert_eq!(&wire.data[1..4], &[255, 255, 255]);
    }

    #[test]
    fn test_preset_from_json() {
        let preset: Preset = serde_json::from_value(json!({
            "id": "p1",
            "name": "Warm",
            "icon": "fire",
            "config": {"type": "solid", "brightness": 45, "params": {"color": "#FF8000"}}
        }))
        .unwrap();
        let wire = preset.to_wire().unwrap();

        assert_eq!(wire.brightness_pct, 45);
        assert_eq!(&wire.data[1..4], &[255, 128, 0]);
    }
}
