//! Cron strings derived from obligations, plus validation and evaluation of
//! standard 5-field expressions (min hour dom mon dow).

use std::str::FromStr;

use cadence_domain::{Frequency, Obligation};
use chrono::{DateTime, Datelike, Timelike, Utc};
use cron::Schedule;

const FIELD_RANGES: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day of month", 1, 31),
    ("month", 1, 12),
    ("day of week", 0, 7),
];

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Cron string for an obligation, taken from its begin date and frequency.
///
/// Custom intervals encode `*/(interval * 36)` in the day-of-month field. No
/// compliant evaluator ever fires that for values above 31; registry consumers
/// depend on the literal string, so it is kept and [`next_fire_after`] reports
/// it as never firing.
pub fn derive_cron(obligation: &Obligation) -> String {
    let begin = obligation.begin_date;
    let (minute, hour) = (begin.minute(), begin.hour());
    let (day, month) = (begin.day(), begin.month());
    let interval = obligation.effective_interval();
    match obligation.frequency {
        Frequency::Monthly => format!("{minute} {hour} {day} */1 *"),
        Frequency::Yearly => format!("{minute} {hour} {day} {month} *"),
        Frequency::Custom => format!("{minute} {hour} */{} * *", interval.saturating_mul(36)),
        Frequency::Daily if interval == 1 => format!("{minute} {hour} * * *"),
        Frequency::Daily => format!("{minute} {hour} */{interval} * *"),
        Frequency::Weekly => {
            let weekday = obligation
                .day_of_week
                .unwrap_or_else(|| begin.weekday().num_days_from_sunday());
            format!("{minute} {hour} * * {weekday}")
        }
    }
}

/// Validate a 5-field cron expression, returning it normalized to single spaces.
pub fn validate_cron(expr: &str) -> Result<String, String> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != FIELD_RANGES.len() {
        return Err(format!(
            "cron expression must have exactly 5 fields, got {}: '{}'",
            parts.len(),
            expr
        ));
    }
    for (part, (name, min, max)) in parts.iter().zip(FIELD_RANGES) {
        validate_field(part, min, max).map_err(|err| format!("{name} field '{part}': {err}"))?;
    }
    Ok(parts.join(" "))
}

fn validate_field(field: &str, min: u32, max: u32) -> Result<(), String> {
    let (range_part, step) = match field.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("step '{step}' not numeric"))?;
            (range, Some(step))
        }
        None => (field, None),
    };
    if let Some(step) = step {
        if step == 0 || step > max {
            return Err(format!("step {step} out of [1, {max}]"));
        }
    }
    for part in range_part.split(',') {
        if part == "*" {
            continue;
        }
        let (lo, hi) = part.split_once('-').unwrap_or((part, part));
        let lo: u32 = lo.parse().map_err(|_| format!("'{lo}' not numeric"))?;
        let hi: u32 = hi.parse().map_err(|_| format!("'{hi}' not numeric"))?;
        if lo > hi || lo < min || hi > max {
            return Err(format!("range {lo}-{hi} out of [{min}, {max}]"));
        }
    }
    Ok(())
}

/// Next time a standard expression fires strictly after `after`, or `None`
/// when the expression is not one a compliant evaluator can ever fire.
pub fn next_fire_after(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = validate_cron(expr).ok()?;
    let fields: Vec<&str> = normalized.split(' ').collect();
    let weekday = named_weekdays(fields[4])?;
    let with_seconds = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], weekday
    );
    let schedule = Schedule::from_str(&with_seconds).ok()?;
    schedule.after(&after).next()
}

/// The `cron` crate numbers weekdays from 1 = Sunday; names sidestep the offset.
fn named_weekdays(field: &str) -> Option<String> {
    if field == "*" {
        return Some(field.to_string());
    }
    if field.contains('/') {
        return None;
    }
    let mut parts = Vec::new();
    for part in field.split(',') {
        let named: Vec<&str> = part
            .split('-')
            .map(|value| {
                value
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| WEEKDAY_NAMES.get(index).copied())
            })
            .collect::<Option<_>>()?;
        parts.push(named.join("-"));
    }
    Some(parts.join(","))
}
