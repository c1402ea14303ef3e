//! Datetime items: parsing, rendering, and cross-type comparison.
//!
//! `.datetime()` produces a typed temporal value that exists only in memory;
//! serialization renders it as an ISO-8601 string. Without a template the
//! input is matched against a fixed, ordered list of ISO formats; with a
//! template the input must match exactly. Templates use the `to_char` field
//! names (`YYYY`, `MM`, `DD`, `HH24`, `MI`, `SS`, `TZH:TZM`, ...) translated
//! to chrono format items.

use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::format::{parse as chrono_parse, Parsed, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::error::PathError;

// ---------------------------------------------------------------------------
// Value type
// ---------------------------------------------------------------------------

/// A typed temporal item. The five variants mirror the SQL datetime types a
/// path expression can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DatetimeValue {
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

impl DatetimeValue {
    /// The `.type()` name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DatetimeValue::Date(_) => "date",
            DatetimeValue::Time(_) => "time without time zone",
            DatetimeValue::TimeTz(..) => "time with time zone",
            DatetimeValue::Timestamp(_) => "timestamp without time zone",
            DatetimeValue::TimestampTz(_) => "timestamp with time zone",
        }
    }

    /// ISO-8601 rendering used when a datetime item is serialized.
    pub fn to_iso_string(&self) -> String {
        let mut out = String::new();
        match self {
            DatetimeValue::Date(d) => {
                let _ = write!(out, "{}", d.format("%Y-%m-%d"));
            }
            DatetimeValue::Time(t) => {
                let _ = write!(out, "{}", t.format("%H:%M:%S"));
                push_fraction(&mut out, t.nanosecond());
            }
            DatetimeValue::TimeTz(t, off) => {
                let _ = write!(out, "{}", t.format("%H:%M:%S"));
                push_fraction(&mut out, t.nanosecond());
                let _ = write!(out, "{off}");
            }
            DatetimeValue::Timestamp(ts) => {
                let _ = write!(out, "{}", ts.format("%Y-%m-%dT%H:%M:%S"));
                push_fraction(&mut out, ts.nanosecond());
            }
            DatetimeValue::TimestampTz(ts) => {
                let _ = write!(out, "{}", ts.format("%Y-%m-%dT%H:%M:%S"));
                push_fraction(&mut out, ts.nanosecond());
                let _ = write!(out, "{}", ts.offset());
            }
        }
        out
    }
}

fn push_fraction(out: &mut String, nanos: u32) {
    if nanos != 0 {
        let micros = nanos / 1_000;
        let _ = write!(out, ".{micros:06}");
        while out.ends_with('0') {
            out.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Time zone argument
// ---------------------------------------------------------------------------

/// The optional second argument of `.datetime(fmt, tz)`: either a zone name
/// or a signed offset in seconds east of UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzSpec {
    Named(String),
    Seconds(i32),
}

impl TzSpec {
    pub(crate) fn resolve(&self) -> Result<FixedOffset, PathError> {
        match self {
            TzSpec::Named(name) if name.eq_ignore_ascii_case("utc") || name == "Z" => {
                FixedOffset::east_opt(0).ok_or(PathError::DatetimeArgument {
                    detail: "time zone offset is out of range".to_string(),
                })
            }
            TzSpec::Named(name) => Err(PathError::DatetimeArgument {
                detail: format!("time zone {name:?} is not recognized"),
            }),
            TzSpec::Seconds(secs) => {
                FixedOffset::east_opt(*secs).ok_or(PathError::DatetimeArgument {
                    detail: "time zone offset is out of range".to_string(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DtKind {
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
}

/// Default template list, tried in order; first success wins. `%#z` accepts
/// both `±hh:mm` and bare `±hh` offsets, and the `T` separator variants make
/// JSON-native timestamps parse without a template.
const DEFAULT_TEMPLATES: &[(&str, DtKind)] = &[
    ("%Y-%m-%d %H:%M:%S%#z", DtKind::TimestampTz),
    ("%Y-%m-%dT%H:%M:%S%#z", DtKind::TimestampTz),
    ("%Y-%m-%d %H:%M:%S", DtKind::Timestamp),
    ("%Y-%m-%dT%H:%M:%S", DtKind::Timestamp),
    ("%Y-%m-%d", DtKind::Date),
    ("%H:%M:%S%#z", DtKind::TimeTz),
    ("%H:%M:%S", DtKind::Time),
];

/// Parse a `.datetime()` input, optionally with a template and a zone.
///
/// A zone argument re-types naive results: timestamps become
/// `timestamp with time zone` and times become `time with time zone`,
/// interpreted in that zone. Inputs that already carry an offset keep it.
pub(crate) fn parse_datetime(
    input: &str,
    template: Option<&str>,
    tz: Option<&TzSpec>,
) -> Result<DatetimeValue, PathError> {
    let value = match template {
        Some(template) => {
            let (fmt, kind) = translate_template(template)?;
            parse_as(input, &fmt, kind)?
        }
        None => parse_default(input)?,
    };

    match (value, tz) {
        (DatetimeValue::Timestamp(ts), Some(spec)) => {
            let off = spec.resolve()?;
            let zoned = off
                .from_local_datetime(&ts)
                .single()
                .ok_or_else(|| format_error(input))?;
            Ok(DatetimeValue::TimestampTz(zoned))
        }
        (DatetimeValue::Time(t), Some(spec)) => Ok(DatetimeValue::TimeTz(t, spec.resolve()?)),
        (value, _) => Ok(value),
    }
}

fn parse_default(input: &str) -> Result<DatetimeValue, PathError> {
    for (fmt, kind) in DEFAULT_TEMPLATES {
        if let Ok(value) = parse_as(input, fmt, *kind) {
            return Ok(value);
        }
    }
    Err(format_error(input))
}

fn parse_as(input: &str, fmt: &str, kind: DtKind) -> Result<DatetimeValue, PathError> {
    let mut parsed = Parsed::new();
    chrono_parse(&mut parsed, input, StrftimeItems::new(fmt))
        .map_err(|_| format_error(input))?;

    let value = match kind {
        DtKind::Date => parsed.to_naive_date().map(DatetimeValue::Date),
        DtKind::Time => parsed.to_naive_time().map(DatetimeValue::Time),
        DtKind::TimeTz => parsed.to_naive_time().and_then(|t| {
            parsed
                .to_fixed_offset()
                .map(|off| DatetimeValue::TimeTz(t, off))
        }),
        DtKind::Timestamp => parsed.to_naive_date().and_then(|d| {
            parsed
                .to_naive_time()
                .map(|t| DatetimeValue::Timestamp(d.and_time(t)))
        }),
        DtKind::TimestampTz => {
            let pieces = parsed.to_naive_date().and_then(|d| {
                let t = parsed.to_naive_time()?;
                let off = parsed.to_fixed_offset()?;
                Ok((d.and_time(t), off))
            });
            return match pieces {
                Ok((ts, off)) => off
                    .from_local_datetime(&ts)
                    .single()
                    .map(DatetimeValue::TimestampTz)
                    .ok_or_else(|| format_error(input)),
                Err(_) => Err(format_error(input)),
            };
        }
    };
    value.map_err(|_| format_error(input))
}

fn format_error(input: &str) -> PathError {
    PathError::DatetimeFormat {
        input: input.to_string(),
    }
}

/// `to_char`-style field names, longest first, with their chrono spellings.
const TEMPLATE_FIELDS: &[(&str, &str)] = &[
    ("TZH:TZM", "%z"),
    ("HH24", "%H"),
    ("HH12", "%I"),
    ("YYYY", "%Y"),
    ("TZH", "%#z"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("MI", "%M"),
    ("SS", "%S"),
    ("MS", "%3f"),
    ("US", "%6f"),
    ("HH", "%I"),
    ("AM", "%p"),
    ("PM", "%p"),
];

const DATE_FIELDS: &[&str] = &["YYYY", "MM", "DD"];
const TIME_FIELDS: &[&str] = &["HH24", "HH12", "HH", "MI", "SS", "MS", "US", "AM", "PM"];
const TZ_FIELDS: &[&str] = &["TZH:TZM", "TZH"];

/// Translate a `to_char`-style template into a chrono format string and the
/// datetime type it produces.
fn translate_template(template: &str) -> Result<(String, DtKind), PathError> {
    let mut fmt = String::with_capacity(template.len());
    let (mut has_date, mut has_time, mut has_tz) = (false, false, false);

    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (field, chrono_spec) in TEMPLATE_FIELDS {
            let matches = rest
                .get(..field.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(field));
            if matches {
                fmt.push_str(chrono_spec);
                has_date |= DATE_FIELDS.contains(field);
                has_time |= TIME_FIELDS.contains(field);
                has_tz |= TZ_FIELDS.contains(field);
                rest = &rest[field.len()..];
                continue 'scan;
            }
        }
        let Some(ch) = rest.chars().next() else { break };
        if ch.is_ascii_alphabetic() {
            return Err(PathError::DatetimeArgument {
                detail: format!("unsupported datetime template field near {rest:?}"),
            });
        }
        if ch == '%' {
            fmt.push_str("%%");
        } else {
            fmt.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }

    let kind = match (has_date, has_time, has_tz) {
        (true, true, true) => DtKind::TimestampTz,
        (true, true, false) => DtKind::Timestamp,
        (true, false, _) => DtKind::Date,
        (false, true, true) => DtKind::TimeTz,
        (false, true, false) => DtKind::Time,
        (false, false, _) => {
            return Err(PathError::DatetimeArgument {
                detail: "datetime template contains no date or time fields".to_string(),
            })
        }
    };
    Ok((fmt, kind))
}

// ---------------------------------------------------------------------------
// Cross-type comparison
// ---------------------------------------------------------------------------

/// Compare two datetime items, coercing across types where the SQL datetime
/// model allows it. Returns `None` when the pair is not comparable — either
/// by type, or because a required time zone is not configured.
pub(crate) fn compare_datetimes(
    a: &DatetimeValue,
    b: &DatetimeValue,
    tz: Option<FixedOffset>,
) -> Option<Ordering> {
    use DatetimeValue::*;

    match (a, b) {
        (Date(x), Date(y)) => Some(x.cmp(y)),
        (Time(x), Time(y)) => Some(x.cmp(y)),
        (Timestamp(x), Timestamp(y)) => Some(x.cmp(y)),
        (TimestampTz(x), TimestampTz(y)) => Some(x.cmp(y)),
        (TimeTz(xt, xo), TimeTz(yt, yo)) => Some(utc_time_nanos(*xt, *xo).cmp(&utc_time_nanos(*yt, *yo))),

        (Date(x), Timestamp(y)) => Some(x.and_time(NaiveTime::MIN).cmp(y)),
        (Timestamp(x), Date(y)) => Some(x.cmp(&y.and_time(NaiveTime::MIN))),

        (Date(x), TimestampTz(y)) => zoned(x.and_time(NaiveTime::MIN), tz).map(|x| x.cmp(y)),
        (TimestampTz(x), Date(y)) => zoned(y.and_time(NaiveTime::MIN), tz).map(|y| x.cmp(&y)),

        (Timestamp(x), TimestampTz(y)) => zoned(*x, tz).map(|x| x.cmp(y)),
        (TimestampTz(x), Timestamp(y)) => zoned(*y, tz).map(|y| x.cmp(&y)),

        (Time(x), TimeTz(yt, yo)) => {
            let off = tz?;
            Some(utc_time_nanos(*x, off).cmp(&utc_time_nanos(*yt, *yo)))
        }
        (TimeTz(xt, xo), Time(y)) => {
            let off = tz?;
            Some(utc_time_nanos(*xt, *xo).cmp(&utc_time_nanos(*y, off)))
        }

        _ => None,
    }
}

fn zoned(ts: NaiveDateTime, tz: Option<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    tz?.from_local_datetime(&ts).single()
}

fn utc_time_nanos(t: NaiveTime, off: FixedOffset) -> i64 {
    let local = i64::from(t.num_seconds_from_midnight()) * 1_000_000_000 + i64::from(t.nanosecond());
    local - i64::from(off.local_minus_utc()) * 1_000_000_000
}

// ===========================================================================
// Tests
// ===========================================================================
