//! Durations, wall-clock times and time zones
//!
//! Two kinds of values live here:
//! - durations (`90 min`, `2h`): raw value is the amount in the unit
//! - instants (`9am est`, `now`, `time in tokyo`): raw value is unix seconds
//!   and the unit names the zone the instant is shown in
//!
//! Durations convert through seconds, instants through `UTCTimestamp`.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Captures;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::pattern::{group, Handler, PatternRule, PatternSet};
use crate::error::{ConverterError, ConverterResult};
use crate::services::converter::module::Module;
use crate::services::converter::token::{Token, TokenKind, TokenPattern};
use crate::services::converter::unit::{CalcResult, Unit, UnitType, BRIDGE_TIME, SECONDS};
use crate::services::format::format_trimmed;

pub const NAME: &str = "time";

/// Unit name of instants shown in the system zone
pub const LOCAL: &str = "Local";

const CLOCK_PATTERN: &str = r"\d{1,2}(?::\d{2})?\s*(?:am|pm)|\d{1,2}:\d{2}";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const MONTHS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec";

/// Decimal places shown for durations
const DURATION_PRECISION: u32 = 4;

struct DurationUnit {
    name: &'static str,
    singular: &'static str,
    plural: &'static str,
    millis: i64,
    aliases: &'static [&'static str],
}

impl DurationUnit {
    fn seconds(&self) -> Decimal {
        Decimal::new(self.millis, 3)
    }

    fn unit(&self) -> Unit {
        Unit::new(self.name, UnitType::Time)
    }
}

const DURATIONS: &[DurationUnit] = &[
    DurationUnit {
        name: "ms",
        singular: "millisecond",
        plural: "milliseconds",
        millis: 1,
        aliases: &["ms", "msec", "msecs", "millisecond", "milliseconds"],
    },
    DurationUnit {
        name: "s",
        singular: "second",
        plural: "seconds",
        millis: 1_000,
        aliases: &["s", "sec", "secs", "second", "seconds"],
    },
    DurationUnit {
        name: "min",
        singular: "minute",
        plural: "minutes",
        millis: 60_000,
        aliases: &["m", "min", "mins", "minute", "minutes"],
    },
    DurationUnit {
        name: "h",
        singular: "hour",
        plural: "hours",
        millis: 3_600_000,
        aliases: &["h", "hr", "hrs", "hour", "hours"],
    },
    DurationUnit {
        name: "d",
        singular: "day",
        plural: "days",
        millis: 86_400_000,
        aliases: &["d", "day", "days"],
    },
    DurationUnit {
        name: "w",
        singular: "week",
        plural: "weeks",
        millis: 604_800_000,
        aliases: &["w", "wk", "wks", "week", "weeks"],
    },
    DurationUnit {
        name: "y",
        singular: "year",
        plural: "years",
        millis: 31_536_000_000,
        aliases: &["y", "yr", "yrs", "year", "years"],
    },
];

fn duration_by_name(name: &str) -> Option<&'static DurationUnit> {
    DURATIONS.iter().find(|d| d.name == name)
}

fn duration_by_alias(alias: &str) -> Option<&'static DurationUnit> {
    let alias = alias.to_lowercase();
    DURATIONS.iter().find(|d| d.aliases.contains(&alias.as_str()))
}

/// City names and abbreviations to IANA zones
static ZONE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Asia
    m.insert("shanghai", "Asia/Shanghai");
    m.insert("beijing", "Asia/Shanghai");
    m.insert("shenzhen", "Asia/Shanghai");
    m.insert("guangzhou", "Asia/Shanghai");
    m.insert("chengdu", "Asia/Shanghai");
    m.insert("hong kong", "Asia/Hong_Kong");
    m.insert("hongkong", "Asia/Hong_Kong");
    m.insert("hk", "Asia/Hong_Kong");
    m.insert("hkt", "Asia/Hong_Kong");
    m.insert("tokyo", "Asia/Tokyo");
    m.insert("osaka", "Asia/Tokyo");
    m.insert("jst", "Asia/Tokyo");
    m.insert("singapore", "Asia/Singapore");
    m.insert("sg", "Asia/Singapore");
    m.insert("sgt", "Asia/Singapore");
    m.insert("taipei", "Asia/Taipei");
    m.insert("seoul", "Asia/Seoul");
    m.insert("kst", "Asia/Seoul");
    m.insert("bangkok", "Asia/Bangkok");
    m.insert("dubai", "Asia/Dubai");
    m.insert("delhi", "Asia/Kolkata");
    m.insert("mumbai", "Asia/Kolkata");
    m.insert("ist", "Asia/Kolkata");
    m.insert("jakarta", "Asia/Jakarta");

    // Europe
    m.insert("london", "Europe/London");
    m.insert("uk", "Europe/London");
    m.insert("bst", "Europe/London");
    m.insert("paris", "Europe/Paris");
    m.insert("cet", "Europe/Paris");
    m.insert("berlin", "Europe/Berlin");
    m.insert("rome", "Europe/Rome");
    m.insert("madrid", "Europe/Madrid");
    m.insert("amsterdam", "Europe/Amsterdam");
    m.insert("brussels", "Europe/Brussels");
    m.insert("zurich", "Europe/Zurich");
    m.insert("moscow", "Europe/Moscow");
    m.insert("stockholm", "Europe/Stockholm");
    m.insert("vienna", "Europe/Vienna");
    m.insert("warsaw", "Europe/Warsaw");

    // North America
    m.insert("new york", "America/New_York");
    m.insert("nyc", "America/New_York");
    m.insert("ny", "America/New_York");
    m.insert("boston", "America/New_York");
    m.insert("washington", "America/New_York");
    m.insert("dc", "America/New_York");
    m.insert("miami", "America/New_York");
    m.insert("est", "America/New_York");
    m.insert("edt", "America/New_York");
    m.insert("chicago", "America/Chicago");
    m.insert("dallas", "America/Chicago");
    m.insert("houston", "America/Chicago");
    m.insert("cst", "America/Chicago");
    m.insert("cdt", "America/Chicago");
    m.insert("denver", "America/Denver");
    m.insert("mst", "America/Denver");
    m.insert("mdt", "America/Denver");
    m.insert("los angeles", "America/Los_Angeles");
    m.insert("la", "America/Los_Angeles");
    m.insert("sf", "America/Los_Angeles");
    m.insert("seattle", "America/Los_Angeles");
    m.insert("pst", "America/Los_Angeles");
    m.insert("pdt", "America/Los_Angeles");
    m.insert("toronto", "America/Toronto");
    m.insert("vancouver", "America/Vancouver");

    // Oceania
    m.insert("sydney", "Australia/Sydney");
    m.insert("aest", "Australia/Sydney");
    m.insert("melbourne", "Australia/Melbourne");
    m.insert("brisbane", "Australia/Brisbane");
    m.insert("perth", "Australia/Perth");
    m.insert("auckland", "Pacific/Auckland");
    m.insert("wellington", "Pacific/Auckland");

    // South America
    m.insert("sao paulo", "America/Sao_Paulo");
    m.insert("rio", "America/Sao_Paulo");
    m.insert("buenos aires", "America/Argentina/Buenos_Aires");
    m.insert("santiago", "America/Santiago");
    m.insert("lima", "America/Lima");

    // Africa
    m.insert("cairo", "Africa/Cairo");
    m.insert("johannesburg", "Africa/Johannesburg");
    m.insert("lagos", "Africa/Lagos");
    m.insert("nairobi", "Africa/Nairobi");
    m.insert("casablanca", "Africa/Casablanca");

    // Universal
    m.insert("utc", "UTC");
    m.insert("gmt", "UTC");

    m
});

/// Where an instant is shown
#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    Local,
    Named(Tz),
}

impl Zone {
    /// Parse user text: alias, `local`, or a case-insensitive IANA name
    fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower == "local" {
            return Some(Zone::Local);
        }
        if let Some(iana) = ZONE_ALIASES.get(lower.as_str()) {
            return Tz::from_str(iana).ok().map(Zone::Named);
        }
        Tz::from_str_insensitive(&lower).ok().map(Zone::Named)
    }

    /// Parse a canonical unit name
    fn from_unit_name(name: &str) -> Option<Self> {
        if name == LOCAL {
            return Some(Zone::Local);
        }
        Tz::from_str(name).ok().map(Zone::Named)
    }

    fn unit(self) -> Unit {
        match self {
            Zone::Local => Unit::new(LOCAL, UnitType::Time),
            Zone::Named(tz) => Unit::new(tz.name(), UnitType::Time),
        }
    }

    /// Unix seconds of today's `hour:minute` on this zone's wall clock
    fn clock_today(self, hour: u32, minute: u32) -> ConverterResult<i64> {
        match self {
            Zone::Local => clock_today_in(&Local, hour, minute),
            Zone::Named(tz) => clock_today_in(&tz, hour, minute),
        }
    }

    fn format(self, timestamp: i64) -> ConverterResult<String> {
        match self {
            Zone::Local => Ok(instant_in(&Local, timestamp)?
                .format("%-I:%M %p")
                .to_string()),
            Zone::Named(tz) => Ok(instant_in(&tz, timestamp)?
                .format("%-I:%M %p %Z")
                .to_string()),
        }
    }
}

fn clock_today_in<Z: TimeZone>(zone: &Z, hour: u32, minute: u32) -> ConverterResult<i64> {
    let today = Utc::now().with_timezone(zone).date_naive();
    let naive = today
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| ConverterError::Conversion(format!("invalid time {hour}:{minute:02}")))?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| {
            ConverterError::Conversion(format!("{hour}:{minute:02} does not exist today"))
        })
}

fn instant_in<Z: TimeZone>(zone: &Z, timestamp: i64) -> ConverterResult<DateTime<Z>> {
    zone.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| ConverterError::Conversion(format!("timestamp {timestamp} out of range")))
}

/// Parse `9am`, `9:30 pm`, `14:30` into 24h hour and minute
fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let lower = text.trim().to_lowercase();
    let (body, pm) = if let Some(body) = lower.strip_suffix("am") {
        (body.trim(), Some(false))
    } else if let Some(body) = lower.strip_suffix("pm") {
        (body.trim(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let (hour, minute): (u32, u32) = match body.split_once(':') {
        Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
        None => (body.parse().ok()?, 0),
    };
    if minute > 59 {
        return None;
    }

    match pm {
        Some(_) if hour == 0 || hour > 12 => None,
        Some(pm) => Some((hour % 12 + if pm { 12 } else { 0 }, minute)),
        None if hour > 23 => None,
        None => Some((hour, minute)),
    }
}

fn month_number(text: &str) -> Option<u32> {
    let prefix = text.get(..3)?.to_lowercase();
    MONTHS
        .split('|')
        .position(|m| m == prefix)
        .map(|i| i as u32 + 1)
}

/// Alternation of every zone alias, longest first, plus `local` and IANA paths
fn zone_pattern() -> String {
    let mut aliases: Vec<&str> = ZONE_ALIASES.keys().copied().collect();
    aliases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let alternatives = aliases
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"{alternatives}|local|[a-z]+(?:/[a-z_]+)+")
}

fn duration_pattern() -> String {
    let mut aliases: Vec<&str> = DURATIONS
        .iter()
        .flat_map(|d| d.aliases.iter().copied())
        .collect();
    aliases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    format!(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*({})\b", aliases.join("|"))
}

pub struct TimeModule {
    patterns: PatternSet<Self>,
}

impl TimeModule {
    pub fn new() -> ConverterResult<Self> {
        let zone = zone_pattern();
        let rule = |pattern: String, priority, full: bool, handler: Handler<Self>| {
            let mut pattern =
                TokenPattern::new(pattern, TokenKind::Identifier, priority).owned_by(NAME);
            if full {
                pattern = pattern.full_match();
            }
            PatternRule::new(pattern, handler)
        };

        let rules = vec![
            rule(
                format!(r"(?i)(?:what\s+)?time\s+(?:is\s+it\s+)?in\s+({zone})\??"),
                1000,
                true,
                Self::time_in_zone,
            )?,
            rule(
                format!(r"(?i)({CLOCK_PATTERN})\s+(?:in\s+)?({zone})\b"),
                900,
                false,
                Self::clock_in_zone,
            )?,
            rule(r"(?i)now\b".to_string(), 900, false, Self::now)?,
            rule(
                format!(r"(?i)({CLOCK_PATTERN})"),
                850,
                false,
                Self::clock_local,
            )?,
            rule(
                format!(r"(?i)({WEEKDAYS})\s+in\s+(\d+)(?:\s*days?)?\b"),
                800,
                false,
                Self::weekday_in,
            )?,
            rule(
                format!(
                    r"(?i)days?\s+until\s+(\d{{1,2}})(?:st|nd|rd|th)?\s+((?:{MONTHS})[a-z]*)(?:\s+(\d{{4}}))?"
                ),
                800,
                false,
                Self::days_until,
            )?,
            rule(duration_pattern(), 10, false, Self::duration)?,
        ];

        Ok(Self {
            patterns: PatternSet::new(NAME, rules),
        })
    }

    fn instant(&self, timestamp: i64, zone: Zone) -> ConverterResult<CalcResult> {
        Ok(CalcResult::new(
            zone.format(timestamp)?,
            Decimal::from(timestamp),
            zone.unit(),
            NAME,
        ))
    }

    fn duration_result(&self, amount: Decimal, unit: &DurationUnit) -> CalcResult {
        let label = if amount == Decimal::ONE {
            unit.singular
        } else {
            unit.plural
        };
        CalcResult::new(
            format!("{} {label}", format_trimmed(amount, DURATION_PRECISION)),
            amount,
            unit.unit(),
            NAME,
        )
    }

    fn zone(text: &str) -> ConverterResult<Zone> {
        Zone::parse(text).ok_or_else(|| ConverterError::Conversion(format!("unknown zone: {text}")))
    }

    fn time_in_zone(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let zone = Self::zone(group(caps, 1))?;
        self.instant(Utc::now().timestamp(), zone)
    }

    fn clock_in_zone(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let (hour, minute) = clock(group(caps, 1))?;
        let zone = Self::zone(group(caps, 2))?;
        self.instant(zone.clock_today(hour, minute)?, zone)
    }

    fn clock_local(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let (hour, minute) = clock(group(caps, 1))?;
        self.instant(Zone::Local.clock_today(hour, minute)?, Zone::Local)
    }

    fn now(&self, _caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        self.instant(Utc::now().timestamp(), Zone::Local)
    }

    fn weekday_in(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let weekday = Weekday::from_str(group(caps, 1))
            .map_err(|_| ConverterError::Conversion(format!("invalid weekday: {}", group(caps, 1))))?;
        let days: u64 = group(caps, 2)
            .parse()
            .map_err(|_| ConverterError::Conversion(format!("invalid day count: {}", group(caps, 2))))?;

        let mut date = Local::now()
            .date_naive()
            .checked_add_days(Days::new(days))
            .ok_or(ConverterError::ArithmeticOverflow)?;
        while date.weekday() != weekday {
            date = date.succ_opt().ok_or(ConverterError::ArithmeticOverflow)?;
        }

        let midnight = date.and_hms_opt(0, 0, 0).ok_or(ConverterError::ArithmeticOverflow)?;
        let timestamp = Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| ConverterError::Conversion(format!("no local midnight on {date}")))?;

        Ok(CalcResult::new(
            format!("{} ({})", date.format("%Y-%m-%d"), date.format("%A")),
            Decimal::from(timestamp),
            Zone::Local.unit(),
            NAME,
        ))
    }

    fn days_until(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let invalid = || {
            ConverterError::Conversion(format!(
                "invalid date: {} {} {}",
                group(caps, 1),
                group(caps, 2),
                group(caps, 3)
            ))
        };
        let day: u32 = group(caps, 1).parse().map_err(|_| invalid())?;
        let month = month_number(group(caps, 2)).ok_or_else(invalid)?;
        let year: Option<i32> = match group(caps, 3) {
            "" => None,
            y => Some(y.parse().map_err(|_| invalid())?),
        };

        let today = Local::now().date_naive();
        let mut target = NaiveDate::from_ymd_opt(year.unwrap_or(today.year()), month, day)
            .ok_or_else(invalid)?;
        if year.is_none() && target < today {
            target = NaiveDate::from_ymd_opt(today.year() + 1, month, day).ok_or_else(invalid)?;
        }

        let days = target.signed_duration_since(today).num_days();
        let unit = duration_by_name("d").ok_or_else(invalid)?;
        Ok(self.duration_result(Decimal::from(days), unit))
    }

    fn duration(&self, caps: &Captures<'_>) -> ConverterResult<CalcResult> {
        let amount = Decimal::from_str(group(caps, 1))
            .map_err(|e| ConverterError::Conversion(format!("{}: {e}", group(caps, 1))))?;
        let unit = duration_by_alias(group(caps, 2)).ok_or_else(|| {
            ConverterError::Conversion(format!("unknown duration unit: {}", group(caps, 2)))
        })?;
        Ok(self.duration_result(amount, unit))
    }
}

fn clock(text: &str) -> ConverterResult<(u32, u32)> {
    parse_clock(text).ok_or_else(|| ConverterError::Conversion(format!("invalid time: {text}")))
}

/// Whether `name` is a unit holding unix seconds
fn is_instant(name: &str) -> bool {
    name == BRIDGE_TIME || Zone::from_unit_name(name).is_some()
}

impl Module for TimeModule {
    fn name(&self) -> &str {
        NAME
    }

    fn token_patterns(&self) -> Vec<TokenPattern> {
        self.patterns.token_patterns()
    }

    fn calculate(&self, token: &Token) -> ConverterResult<Option<CalcResult>> {
        self.patterns.dispatch(self, token)
    }

    fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult> {
        let no_path = || ConverterError::NoConversionPath {
            from: value.unit.name.clone(),
            to: to.name.clone(),
        };

        if let (Some(from), Some(target)) =
            (duration_by_name(&value.unit.name), duration_by_name(&to.name))
        {
            let amount = value
                .raw_value
                .checked_mul(from.seconds())
                .and_then(|secs| secs.checked_div(target.seconds()))
                .ok_or(ConverterError::ArithmeticOverflow)?;
            return Ok(self.duration_result(amount, target));
        }

        if !is_instant(&value.unit.name) {
            return Err(no_path());
        }
        let timestamp = value
            .raw_value
            .trunc()
            .to_i64()
            .ok_or(ConverterError::ArithmeticOverflow)?;

        if to.name == BRIDGE_TIME {
            return Ok(CalcResult::new(
                timestamp.to_string(),
                Decimal::from(timestamp),
                Unit::utc_timestamp(),
                NAME,
            ));
        }
        let zone = Zone::from_unit_name(&to.name).ok_or_else(no_path)?;
        self.instant(timestamp, zone)
    }

    fn can_convert_to(&self, unit: &str) -> bool {
        duration_by_name(unit).is_some() || is_instant(unit)
    }

    fn resolve_unit(&self, text: &str) -> Option<Unit> {
        if let Some(duration) = duration_by_alias(text) {
            return Some(duration.unit());
        }
        if matches!(text.to_lowercase().as_str(), "timestamp" | "unix") {
            return Some(Unit::utc_timestamp());
        }
        Zone::parse(text).map(Zone::unit)
    }

    fn arithmetic_unit(&self, unit: &Unit) -> Option<Unit> {
        if duration_by_name(&unit.name).is_some() {
            duration_by_name(SECONDS).map(DurationUnit::unit)
        } else if is_instant(&unit.name) {
            Some(Unit::utc_timestamp())
        } else {
            None
        }
    }
}
