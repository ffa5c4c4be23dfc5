use chrono::{Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::deadline::error::DeadlineError;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

/// Parses a relative duration token and returns the absolute target instant
/// (epoch seconds). The target is rounded up to a whole second so sub-second
/// jitter at parse time never shortens the deadline.
pub fn parse_duration(raw: &str, now_epoch: f64) -> Result<f64, DeadlineError> {
    let secs = parse_duration_secs(raw)?;
    Ok(now_epoch.ceil() + secs as f64)
}

/// Accepts `<n>d`, `<n>h`, `<n>m`, `<n>s` groups in any order and any subset
/// (units case-insensitive, repeats summed). A bare number means minutes.
/// Values past `u64` saturate; the bounds check rejects them as too far away.
pub fn parse_duration_secs(raw: &str) -> Result<u64, DeadlineError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(DeadlineError::format("duration", raw, "value is empty"));
    }

    if token.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(parse_count(token).saturating_mul(SECONDS_PER_MINUTE));
    }

    let bytes = token.as_bytes();
    let mut total: u64 = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == start {
            return Err(DeadlineError::format(
                "duration",
                raw,
                format!("expected a number at position {}", start + 1),
            ));
        }
        let count = parse_count(&token[start..pos]);

        let Some(unit) = bytes.get(pos) else {
            return Err(DeadlineError::format(
                "duration",
                raw,
                format!(
                    "missing unit after '{}', expected one of d, h, m, s",
                    &token[start..pos]
                ),
            ));
        };
        let multiplier = match unit.to_ascii_lowercase() {
            b'd' => SECONDS_PER_DAY,
            b'h' => SECONDS_PER_HOUR,
            b'm' => SECONDS_PER_MINUTE,
            b's' => 1,
            _ => {
                return Err(DeadlineError::format(
                    "duration",
                    raw,
                    format!(
                        "unknown unit '{}', expected one of d, h, m, s",
                        char::from(*unit)
                    ),
                ));
            }
        };
        pos += 1;

        total = total.saturating_add(count.saturating_mul(multiplier));
    }

    Ok(total)
}

/// `digits` is non-empty ASCII digits, so parsing only fails on overflow.
fn parse_count(digits: &str) -> u64 {
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

/// Parses `YYYY-[M]M-[D]D [H]H:[M]M:[S]S` as a wall-clock time in the local
/// timezone. Returns the target epoch seconds and the local fields as written.
pub fn parse_until(raw: &str) -> Result<(f64, NaiveDateTime), DeadlineError> {
    parse_until_in_tz(raw, &Local)
}

pub fn parse_until_in_tz<Tz>(raw: &str, timezone: &Tz) -> Result<(f64, NaiveDateTime), DeadlineError>
where
    Tz: TimeZone,
{
    let fields = match_timestamp_fields(raw).ok_or_else(|| {
        DeadlineError::format(
            "timestamp",
            raw,
            "expected YYYY-MM-DD HH:MM:SS (1-2 digit month, day, hour, minute, second)",
        )
    })?;
    let local = fields.to_calendar(raw)?;
    let resolved = resolve_local(timezone, local)?;
    Ok((resolved.timestamp() as f64, local))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimestampFields {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl TimestampFields {
    fn to_calendar(self, raw: &str) -> Result<NaiveDateTime, DeadlineError> {
        if !(1..=12).contains(&self.month) {
            return Err(DeadlineError::calendar(
                raw,
                format!("month {} is not between 1 and 12", self.month),
            ));
        }
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            DeadlineError::calendar(
                raw,
                format!(
                    "day {} does not exist in {:04}-{:02}",
                    self.day, self.year, self.month
                ),
            )
        })?;
        if self.hour > 23 {
            return Err(DeadlineError::calendar(
                raw,
                format!("hour {} is not between 0 and 23", self.hour),
            ));
        }
        if self.minute > 59 {
            return Err(DeadlineError::calendar(
                raw,
                format!("minute {} is not between 0 and 59", self.minute),
            ));
        }
        if self.second > 59 {
            return Err(DeadlineError::calendar(
                raw,
                format!("second {} is not between 0 and 59", self.second),
            ));
        }
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, self.second)
            .ok_or_else(|| DeadlineError::calendar(raw, "time of day is invalid"))?;
        Ok(date.and_time(time))
    }
}

fn match_timestamp_fields(raw: &str) -> Option<TimestampFields> {
    let mut scan = Scanner::new(raw.trim());
    let year = scan.digits(4, 4)?;
    scan.separator(b'-')?;
    let month = scan.digits(1, 2)?;
    scan.separator(b'-')?;
    let day = scan.digits(1, 2)?;
    if scan.skip_whitespace() == 0 {
        return None;
    }
    let hour = scan.digits(1, 2)?;
    scan.separator(b':')?;
    let minute = scan.digits(1, 2)?;
    scan.separator(b':')?;
    let second = scan.digits(1, 2)?;
    if !scan.is_done() {
        return None;
    }

    Some(TimestampFields {
        year: i32::try_from(year).ok()?,
        month,
        day,
        hour,
        minute,
        second,
    })
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
        self.pos - start
    }

    fn digits(&mut self, min: usize, max: usize) -> Option<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while self.pos - start < max {
            let Some(b) = self.bytes.get(self.pos).filter(|b| b.is_ascii_digit()) else {
                break;
            };
            value = value * 10 + u32::from(b - b'0');
            self.pos += 1;
        }
        (self.pos - start >= min).then_some(value)
    }

    fn separator(&mut self, expected: u8) -> Option<()> {
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&expected) {
            return None;
        }
        self.pos += 1;
        self.skip_whitespace();
        Some(())
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

fn resolve_local<Tz>(timezone: &Tz, local: NaiveDateTime) -> Result<chrono::DateTime<Tz>, DeadlineError>
where
    Tz: TimeZone,
{
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::None => Err(DeadlineError::NonexistentLocalTime {
            local: local.format("%Y-%m-%d %H:%M:%S").to_string(),
        }),
        LocalResult::Ambiguous(_, _) => Err(DeadlineError::AmbiguousLocalTime {
            local: local.format("%Y-%m-%d %H:%M:%S").to_string(),
        }),
    }
}
