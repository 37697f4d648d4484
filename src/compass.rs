use crate::error::ConfigError;

/// Lower bound of the heading range, inclusive.
pub const HEADING_MIN: f64 = -180.0;
/// Upper bound of the heading range, exclusive.
pub const HEADING_MAX: f64 = 180.0;

/// Wraps `x` into `[lower, upper)`.
///
/// Values already inside the range come back unchanged, so the function is
/// idempotent. `x == upper` maps to `lower`. A range with `lower >= upper`
/// is a setup defect and is rejected.
pub fn normalize(x: f64, lower: f64, upper: f64) -> Result<f64, ConfigError> {
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(ConfigError::InvalidRange {
            name: "normalize",
            lower,
            upper,
        });
    }
    Ok(wrap(x, lower, upper))
}

/// Wraps a heading into `[-180, 180)`.
pub fn normalize_heading(x: f64) -> f64 {
    wrap(x, HEADING_MIN, HEADING_MAX)
}

fn wrap(x: f64, lower: f64, upper: f64) -> f64 {
    if (lower..upper).contains(&x) || !x.is_finite() {
        return x;
    }
    let wrapped = lower + (x - lower).rem_euclid(upper - lower);
    // rem_euclid can round up to the full width for tiny negative offsets
    if wrapped >= upper { lower } else { wrapped }
}

/// 8-point compass rose, used for human-readable status lines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let abbreviation = match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        };
        write!(f, "{}", abbreviation)
    }
}

/// Names the sector a heading points into. Accepts any range, e.g. the
/// estimator's signed `[-180, 180)` headings.
pub fn heading_to_direction(heading: f64) -> Direction {
    let bearing = heading.rem_euclid(360.0);

    // each direction covers 45 degrees (360 / 8)
    match bearing {
        h if h < 22.5 => Direction::N,
        h if h < 67.5 => Direction::NE,
        h if h < 112.5 => Direction::E,
        h if h < 157.5 => Direction::SE,
        h if h < 202.5 => Direction::S,
        h if h < 247.5 => Direction::SW,
        h if h < 292.5 => Direction::W,
        h if h < 337.5 => Direction::NW,
        _ => Direction::N,
    }
}
