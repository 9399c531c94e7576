//! Parsers for the string-encoded primitive types: timestamps, versions,
//! ranges and scalar units. Each parser yields a comparable representation.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;

use profile_types::ProfileValue;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+)(?:\.([0-9A-Za-z_]+)(?:-(\d+))?)?)?$")
        .expect("version regex is valid")
});

static SCALAR_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*([A-Za-z]+)\s*$")
        .expect("scalar unit regex is valid")
});

/// Marker accepted as the upper bound of a range
pub const UNBOUNDED: &str = "UNBOUNDED";

// ── Timestamps ───────────────────────────────────────────────────

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC)
/// or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts);
    }
    let utc = FixedOffset::east_opt(0)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(utc.from_utc_datetime(&naive))
}

// ── Versions ─────────────────────────────────────────────────────

/// `major.minor[.fix[.qualifier[-build]]]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub fix: u64,
    pub qualifier: Option<String>,
    pub build: u64,
}

impl Version {
    pub fn parse(text: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(text)?;
        let number = |i: usize| -> Option<u64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };
        Some(Self {
            major: number(1)?,
            minor: number(2)?,
            fix: number(3)?,
            qualifier: caps.get(4).map(|m| m.as_str().to_string()),
            build: number(5)?,
        })
    }
}

// ── Ranges ───────────────────────────────────────────────────────

/// Inclusive integer range; `upper == None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub lower: i64,
    pub upper: Option<i64>,
}

impl Range {
    pub fn parse(value: &ProfileValue) -> Result<Self, String> {
        let ProfileValue::Sequence(items) = value else {
            return Err("expected a two-element list".to_string());
        };
        let [lower, upper] = items.as_slice() else {
            return Err(format!(
                "expected a two-element list, found {} element(s)",
                items.len()
            ));
        };
        let lower = lower
            .as_i64()
            .ok_or_else(|| "range lower bound must be an integer".to_string())?;
        let upper = match upper {
            ProfileValue::String(s) if s == UNBOUNDED => None,
            other => Some(other.as_i64().ok_or_else(|| {
                format!("range upper bound must be an integer or {UNBOUNDED}")
            })?),
        };
        if let Some(upper) = upper {
            if lower > upper {
                return Err(format!("range lower bound {lower} exceeds upper bound {upper}"));
            }
        }
        Ok(Self { lower, upper })
    }
}

// ── Scalar units ─────────────────────────────────────────────────

/// Families of scalar-unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarUnitKind {
    Size,
    Time,
    Frequency,
    Bitrate,
}

const SIZE_UNITS: &[(&str, f64)] = &[
    ("B", 1.0),
    ("kB", 1e3),
    ("KiB", 1024.0),
    ("MB", 1e6),
    ("MiB", 1_048_576.0),
    ("GB", 1e9),
    ("GiB", 1_073_741_824.0),
    ("TB", 1e12),
    ("TiB", 1_099_511_627_776.0),
];

const TIME_UNITS: &[(&str, f64)] = &[
    ("d", 86_400.0),
    ("h", 3_600.0),
    ("m", 60.0),
    ("s", 1.0),
    ("ms", 1e-3),
    ("us", 1e-6),
    ("ns", 1e-9),
];

const FREQUENCY_UNITS: &[(&str, f64)] = &[
    ("Hz", 1.0),
    ("kHz", 1e3),
    ("MHz", 1e6),
    ("GHz", 1e9),
];

const BITRATE_UNITS: &[(&str, f64)] = &[
    ("bps", 1.0),
    ("Kbps", 1e3),
    ("Kibps", 1024.0),
    ("Mbps", 1e6),
    ("Mibps", 1_048_576.0),
    ("Gbps", 1e9),
    ("Gibps", 1_073_741_824.0),
    ("Tbps", 1e12),
    ("Tibps", 1_099_511_627_776.0),
    ("Bps", 8.0),
    ("KBps", 8e3),
    ("KiBps", 8.0 * 1024.0),
    ("MBps", 8e6),
    ("MiBps", 8.0 * 1_048_576.0),
    ("GBps", 8e9),
    ("GiBps", 8.0 * 1_073_741_824.0),
];

impl ScalarUnitKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "scalar-unit.size" => Some(Self::Size),
            "scalar-unit.time" => Some(Self::Time),
            "scalar-unit.frequency" => Some(Self::Frequency),
            "scalar-unit.bitrate" => Some(Self::Bitrate),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Size => "scalar-unit.size",
            Self::Time => "scalar-unit.time",
            Self::Frequency => "scalar-unit.frequency",
            Self::Bitrate => "scalar-unit.bitrate",
        }
    }

    fn units(&self) -> &'static [(&'static str, f64)] {
        match self {
            Self::Size => SIZE_UNITS,
            Self::Time => TIME_UNITS,
            Self::Frequency => FREQUENCY_UNITS,
            Self::Bitrate => BITRATE_UNITS,
        }
    }

    /// Bitrate units distinguish bits from bytes by case; the others do not.
    fn multiplier(&self, unit: &str) -> Option<f64> {
        let units = self.units();
        let found = match self {
            Self::Bitrate => units.iter().find(|(u, _)| *u == unit),
            _ => units.iter().find(|(u, _)| u.eq_ignore_ascii_case(unit)),
        };
        found.map(|(_, m)| *m)
    }

    /// Parse `"<number> <unit>"` into the family's base unit
    pub fn parse(&self, text: &str) -> Result<f64, String> {
        let caps = SCALAR_UNIT_RE
            .captures(text)
            .ok_or_else(|| format!("'{text}' is not of the form \"<number> <unit>\""))?;
        let number: f64 = caps[1]
            .parse()
            .map_err(|_| format!("'{}' is not a number", &caps[1]))?;
        let multiplier = self
            .multiplier(&caps[2])
            .ok_or_else(|| format!("unknown {} unit '{}'", self.type_name(), &caps[2]))?;
        Ok(number * multiplier)
    }
}
