//! Statistic catalogue and the display rules shared by every aggregate kind.

use chrono::{DateTime, SecondsFormat};
use std::fmt;
use std::str::FromStr;
use strata_columnar::ColumnType;
use thiserror::Error;

/// Rendered in place of any statistic of a state that has seen no values.
pub const NO_DATA: &str = "-";

/// A statistic a rollup cell can display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Statistic {
    Count,
    Sum,
    Avg,
    StdDev,
    Min,
    Max,
    True,
    False,
    Ratio,
    Distinct,
    Span,
}

struct StatisticInfo {
    name: &'static str,
    symbol: &'static str,
    title: &'static str,
}

impl Statistic {
    pub const ALL: [Statistic; 11] = [
        Statistic::Count,
        Statistic::Sum,
        Statistic::Avg,
        Statistic::StdDev,
        Statistic::Min,
        Statistic::Max,
        Statistic::True,
        Statistic::False,
        Statistic::Ratio,
        Statistic::Distinct,
        Statistic::Span,
    ];

    fn info(self) -> StatisticInfo {
        let (name, symbol, title) = match self {
            Statistic::Count => ("count", "#", "Count"),
            Statistic::Sum => ("sum", "Σ", "Sum"),
            Statistic::Avg => ("avg", "μ", "Average"),
            Statistic::StdDev => ("stddev", "σ", "Standard deviation"),
            Statistic::Min => ("min", "↓", "Minimum"),
            Statistic::Max => ("max", "↑", "Maximum"),
            Statistic::True => ("true", "✓", "True"),
            Statistic::False => ("false", "✗", "False"),
            Statistic::Ratio => ("ratio", "%", "True ratio"),
            Statistic::Distinct => ("distinct", "≠", "Distinct values"),
            Statistic::Span => ("span", "↔", "Span"),
        };
        StatisticInfo {
            name,
            symbol,
            title,
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn symbol(self) -> &'static str {
        self.info().symbol
    }

    pub fn title(self) -> &'static str {
        self.info().title
    }

    /// Whether states built for `column_type` can render this statistic.
    pub fn applies_to(self, column_type: ColumnType) -> bool {
        use Statistic::*;
        match column_type {
            ColumnType::Number => matches!(self, Count | Sum | Avg | StdDev | Min | Max),
            ColumnType::Boolean => matches!(self, Count | True | False | Ratio),
            ColumnType::String => matches!(self, Count | Distinct | Min | Max),
            ColumnType::DateTime => matches!(self, Count | Min | Max | Avg | StdDev | Span),
        }
    }

    /// The statistics applicable to `column_type`, in catalogue order.
    pub fn for_type(column_type: ColumnType) -> impl Iterator<Item = Statistic> {
        Self::ALL
            .into_iter()
            .filter(move |s| s.applies_to(column_type))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown statistic: {0}")]
pub struct UnknownStatistic(pub String);

impl FromStr for Statistic {
    type Err = UnknownStatistic;

    /// Accepts a name (case-insensitive) or a symbol.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Statistic::ALL
            .into_iter()
            .find(|stat| stat.name().eq_ignore_ascii_case(trimmed) || stat.symbol() == trimmed)
            .ok_or_else(|| UnknownStatistic(s.to_string()))
    }
}

/// Integral values render without a decimal point; fractional values keep at
/// most two fractional digits with trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

const SECOND: f64 = 1.0;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.0 * DAY;

const DURATION_UNITS: [(f64, &str); 6] = [
    (YEAR, "y"),
    (MONTH, "mo"),
    (DAY, "d"),
    (HOUR, "h"),
    (MINUTE, "m"),
    (SECOND, "s"),
];

/// Renders a nanosecond duration in the coarsest unit whose magnitude is at
/// least one, with one decimal place. Sub-second durations use seconds.
pub fn format_duration(nanos: f64) -> String {
    let seconds = nanos / 1e9;
    let magnitude = seconds.abs();
    let (unit, suffix) = DURATION_UNITS
        .into_iter()
        .find(|(unit, _)| magnitude >= *unit)
        .unwrap_or((SECOND, "s"));
    format!("{:.1}{suffix}", seconds / unit)
}

/// RFC 3339 rendering (UTC) of epoch nanoseconds.
pub fn format_datetime(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
