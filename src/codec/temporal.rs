// Copyright (c) 2020 rust-mysql-simple contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Text-protocol temporal parsers and literal formatters.
//!
//! Parsers never fail loudly: MySQL happily stores `0000-00-00` and similar
//! values, so anything that is not a valid calendar value becomes `None`.

use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::Value;

fn parse_num<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Fraction of a second, right-padded to microseconds.
fn parse_micros(s: &str) -> Option<u32> {
    if s.len() > 6 {
        return None;
    }
    let value: u32 = parse_num(s)?;
    Some(value * 10u32.pow(6 - s.len() as u32))
}

/// `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<Date> {
    let mut parts = s.splitn(3, '-');
    let year: i32 = parse_num(parts.next()?)?;
    let month: u8 = parse_num(parts.next()?)?;
    let day: u8 = parse_num(parts.next()?)?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// `hh:mm[:ss[.ffffff]]` within a single day.
fn parse_time_of_day(s: &str) -> Option<Time> {
    let (hms, micros) = match s.split_once('.') {
        Some((hms, frac)) => (hms, parse_micros(frac)?),
        None => (s, 0),
    };
    let mut parts = hms.split(':');
    let hour: u8 = parse_num(parts.next()?)?;
    let minute: u8 = parse_num(parts.next()?)?;
    let second: u8 = match parts.next() {
        Some(second) => parse_num(second)?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Time::from_hms_micro(hour, minute, second, micros).ok()
}

/// `DATETIME` column: `Value::DateTime`, a `Value::Date` when only the date
/// part is usable, or `None`.
pub fn parse_datetime(s: &str) -> Option<Value> {
    let sep = if s.contains(' ') {
        ' '
    } else if s.contains('T') {
        'T'
    } else {
        return parse_date(s).map(Value::Date);
    };
    let parsed = s.split_once(sep).and_then(|(date, time)| {
        Some(PrimitiveDateTime::new(
            parse_date(date)?,
            parse_time_of_day(time)?,
        ))
    });
    match parsed {
        Some(datetime) => Some(Value::DateTime(datetime)),
        None => parse_date(s).map(Value::Date),
    }
}

/// `TIMESTAMP` column. Servers before 4.1 send the compact `YYYYMMDDhhmmss`
/// form, possibly truncated.
pub fn parse_timestamp(s: &str) -> Option<Value> {
    if s.as_bytes().get(4) == Some(&b'-') {
        return parse_datetime(s);
    }
    if s.len() > 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = String::with_capacity(14);
    padded.push_str(s);
    while padded.len() < 14 {
        padded.push('0');
    }
    let year: i32 = parse_num(&padded[0..4])?;
    let month: u8 = parse_num(&padded[4..6])?;
    let day: u8 = parse_num(&padded[6..8])?;
    let hour: u8 = parse_num(&padded[8..10])?;
    let minute: u8 = parse_num(&padded[10..12])?;
    let second: u8 = parse_num(&padded[12..14])?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(Value::DateTime(PrimitiveDateTime::new(date, time)))
}

/// `TIME` column: `[-]h:mm:ss[.ffffff]`, hours unbounded. A leading day count
/// (`[-]D hh:mm:ss`, the literal form) is accepted as well.
pub fn parse_time(s: &str) -> Option<Duration> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (days, hms) = match unsigned.split_once(' ') {
        Some((days, hms)) => (parse_num::<i64>(days)?, hms),
        None => (0, unsigned),
    };
    let mut parts = hms.split(':');
    let hours: i64 = parse_num(parts.next()?)?;
    let minutes: i64 = parse_num(parts.next()?)?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let (seconds, micros) = match seconds_part.split_once('.') {
        Some((seconds, frac)) => (parse_num::<i64>(seconds)?, parse_micros(frac)?),
        None => (parse_num::<i64>(seconds_part)?, 0),
    };
    if minutes > 59 || seconds > 59 {
        return None;
    }
    let seconds = days
        .checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    let total = Duration::new(seconds, micros as i32 * 1000);
    Some(if negative { -total } else { total })
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn format_datetime(datetime: PrimitiveDateTime) -> String {
    let mut out = format!(
        "{} {:02}:{:02}:{:02}",
        format_date(datetime.date()),
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    );
    if datetime.microsecond() != 0 {
        out.push_str(&format!(".{:06}", datetime.microsecond()));
    }
    out
}

/// `[-]D hh:mm:ss[.ffffff]`, days split off the hours.
pub fn format_time(duration: Duration) -> String {
    let sign = if duration.is_negative() { "-" } else { "" };
    let duration = duration.abs();
    let total = duration.whole_seconds();
    let mut out = format!(
        "{}{} {:02}:{:02}:{:02}",
        sign,
        total / 86_400,
        (total / 3600) % 24,
        (total / 60) % 60,
        total % 60
    );
    let micros = duration.subsec_microseconds();
    if micros != 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use time::{Date, Duration, Month, PrimitiveDateTime, Time};

    fn dt(y: i32, mo: u8, d: u8, h: u8, mi: u8, s: u8, us: u32) -> PrimitiveDateTime {
        PrimitiveDateTime::new(
            Date::from_calendar_date(y, Month::try_from(mo).unwrap(), d).unwrap(),
            Time::from_hms_micro(h, mi, s, us).unwrap(),
        )
    }

    #[test]
    fn should_parse_dates() {
        assert_eq!(
            parse_date("2007-02-25"),
            Some(Date::from_calendar_date(2007, Month::February, 25).unwrap())
        );
        assert_eq!(parse_date("0000-00-00"), None);
        assert_eq!(parse_date("2007-02-30"), None);
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn should_parse_datetimes() {
        assert_eq!(
            parse_datetime("2007-02-25 23:06:20"),
            Some(Value::DateTime(dt(2007, 2, 25, 23, 6, 20, 0)))
        );
        assert_eq!(
            parse_datetime("2007-02-25T23:06:20.5"),
            Some(Value::DateTime(dt(2007, 2, 25, 23, 6, 20, 500_000)))
        );
        assert_eq!(parse_datetime("2007-02-25 99:06:20"), None);
        assert_eq!(parse_datetime("0000-00-00 00:00:00"), None);
        assert_eq!(
            parse_datetime("2007-02-25"),
            Some(Value::Date(
                Date::from_calendar_date(2007, Month::February, 25).unwrap()
            ))
        );
    }

    #[test]
    fn should_parse_legacy_timestamps() {
        assert_eq!(
            parse_timestamp("20070225230620"),
            Some(Value::DateTime(dt(2007, 2, 25, 23, 6, 20, 0)))
        );
        assert_eq!(
            parse_timestamp("200702252306"),
            Some(Value::DateTime(dt(2007, 2, 25, 23, 6, 0, 0)))
        );
        assert_eq!(
            parse_timestamp("2007-02-25 23:06:20"),
            Some(Value::DateTime(dt(2007, 2, 25, 23, 6, 20, 0)))
        );
        assert_eq!(parse_timestamp("00000000000000"), None);
    }

    #[test]
    fn should_parse_times() {
        assert_eq!(parse_time("12:30:05"), Some(Duration::seconds(45005)));
        assert_eq!(
            parse_time("-838:59:59"),
            Some(-Duration::seconds(838 * 3600 + 59 * 60 + 59))
        );
        assert_eq!(
            parse_time("-00:00:01.25"),
            Some(-Duration::new(1, 250_000_000))
        );
        assert_eq!(parse_time("12:30"), None);
        assert_eq!(parse_time("xx:30:00"), None);
        assert_eq!(parse_time("9999999999999999:00:00"), None);
        assert_eq!(parse_time("-9223372036854775807:59:59"), None);
        assert_eq!(parse_time("999999999999999 00:00:00"), None);
        assert_eq!(
            parse_time("-1 02:00:00.5"),
            Some(-Duration::new(26 * 3600, 500_000_000))
        );
    }

    #[test]
    fn should_format_temporal_literals() {
        assert_eq!(
            format_date(Date::from_calendar_date(7, Month::March, 1).unwrap()),
            "0007-03-01"
        );
        assert_eq!(
            format_datetime(dt(2007, 2, 25, 23, 6, 20, 0)),
            "2007-02-25 23:06:20"
        );
        assert_eq!(
            format_datetime(dt(2007, 2, 25, 23, 6, 20, 1500)),
            "2007-02-25 23:06:20.001500"
        );
        let time = -Duration::new(100 * 3600 + 61, 10_000);
        assert_eq!(format_time(time), "-4 04:01:01.000010");
        assert_eq!(format_time(Duration::seconds(45005)), "0 12:30:05");
        assert_eq!(parse_time(&format_time(time)), Some(time));
    }
}
