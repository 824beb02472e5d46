//! Timestamped commit messages
//!
//! Formats use Luxon-style tokens (`yyyy-LL-dd HH:mm`) so existing GitDoc
//! settings keep working. Runs of the same letter form one token, text in
//! single quotes is literal, and everything else is copied as-is.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// A zone used to display the commit timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayZone {
    Utc,
    Fixed(FixedOffset),
    Named(Tz),
}

impl FromStr for DisplayZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::Utc);
        }

        if let Some(offset) = parse_offset(s) {
            return Ok(Self::Fixed(offset));
        }

        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| Error::Config(format!("Unknown time zone: {}", s)))
    }
}

/// Parse `+05:30`, `-0800` or `UTC+2`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s);
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        3 | 4 => {
            let split = digits.len() - 2;
            (digits[..split].parse().ok()?, digits[split..].parse().ok()?)
        }
        _ => return None,
    };

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Render `instant` with `format`, optionally reprojected into `zone`
pub fn format_message(instant: DateTime<Utc>, format: &str, zone: Option<&str>) -> Result<String> {
    let zone = match zone.filter(|z| !z.trim().is_empty()) {
        Some(z) => z.parse::<DisplayZone>()?,
        None => return Ok(format_tokens(&instant.with_timezone(&chrono::Local), format)),
    };

    Ok(match zone {
        DisplayZone::Utc => format_tokens(&instant, format),
        DisplayZone::Fixed(offset) => format_tokens(&instant.with_timezone(&offset), format),
        DisplayZone::Named(tz) => format_tokens(&instant.with_timezone(&tz), format),
    })
}

/// Format a date with Luxon-style tokens
pub fn format_tokens<Z>(dt: &DateTime<Z>, format: &str) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::with_capacity(format.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // quoted literal, '' is an escaped quote
            let mut j = i + 1;
            while j < chars.len() && chars[j] != '\'' {
                out.push(chars[j]);
                j += 1;
            }
            if j == i + 1 && j < chars.len() {
                out.push('\'');
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        match token(dt, c, run) {
            Some(rendered) => out.push_str(&rendered),
            None => (0..run).for_each(|_| out.push(c)),
        }
        i += run;
    }

    out
}

fn token<Z>(dt: &DateTime<Z>, c: char, run: usize) -> Option<String>
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let spec = match (c, run) {
        ('y', 4) | ('y', 1) => "%Y",
        ('y', 2) => "%y",
        ('L', 4) | ('M', 4) => "%B",
        ('L', 3) | ('M', 3) => "%b",
        ('L', 2) | ('M', 2) => "%m",
        ('L', 1) | ('M', 1) => "%-m",
        ('d', 2) => "%d",
        ('d', 1) => "%-d",
        ('E', 4) | ('c', 4) => "%A",
        ('E', 3) | ('c', 3) => "%a",
        ('H', 2) => "%H",
        ('H', 1) => "%-H",
        ('h', 2) => "%I",
        ('h', 1) => "%-I",
        ('m', 2) => "%M",
        ('m', 1) => "%-M",
        ('s', 2) => "%S",
        ('s', 1) => "%-S",
        ('S', 3) => "%3f",
        ('a', 1) => "%p",
        ('Z', 1) => "%:z",
        ('Z', 2) => "%z",
        ('z', 1) => "%Z",
        // presets
        ('D', 1) => "%-m/%-d/%Y",
        ('D', 2) => "%b %-d, %Y",
        ('t', 1) => "%-I:%M %p",
        ('T', 1) => "%H:%M",
        ('f', 1) => "%-m/%-d/%Y, %-I:%M %p",
        ('f', 2) => "%b %-d, %Y, %-I:%M %p",
        _ => return None,
    };

    Some(dt.format(spec).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_date_tokens() {
        assert_eq!(format_tokens(&instant(), "yyyy-LL-dd"), "2024-03-07");
        assert_eq!(format_tokens(&instant(), "yy/L/d"), "24/3/7");
        assert_eq!(format_tokens(&instant(), "LLLL LLL MMM"), "March Mar Mar");
        assert_eq!(format_tokens(&instant(), "EEEE"), "Thursday");
    }

    #[test]
    fn test_time_tokens() {
        assert_eq!(format_tokens(&instant(), "HH:mm:ss"), "14:05:09");
        assert_eq!(format_tokens(&instant(), "h:mm a"), "2:05 PM");
    }

    #[test]
    fn test_presets() {
        assert_eq!(format_tokens(&instant(), "ff"), "Mar 7, 2024, 2:05 PM");
        assert_eq!(format_tokens(&instant(), "D"), "3/7/2024");
        assert_eq!(format_tokens(&instant(), "T"), "14:05");
    }

    #[test]
    fn test_literals() {
        assert_eq!(format_tokens(&instant(), "'Saved' yyyy"), "Saved 2024");
        assert_eq!(format_tokens(&instant(), "yyyy 'o''clock'"), "2024 oclock");
        assert_eq!(format_tokens(&instant(), "[yyyy]"), "[2024]");
        // unknown letters pass through
        assert_eq!(format_tokens(&instant(), "qq"), "qq");
    }

    #[test]
    fn test_zone_reprojection() {
        let msg = format_message(instant(), "HH:mm", Some("+05:30")).unwrap();
        assert_eq!(msg, "19:35");

        let msg = format_message(instant(), "HH:mm", Some("UTC")).unwrap();
        assert_eq!(msg, "14:05");

        let msg = format_message(instant(), "yyyy-LL-dd HH:mm", Some("America/New_York")).unwrap();
        assert_eq!(msg, "2024-03-07 09:05");
    }

    #[test]
    fn test_offsets() {
        assert_eq!(
            "-0800".parse::<DisplayZone>().unwrap(),
            DisplayZone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert_eq!(
            "UTC+2".parse::<DisplayZone>().unwrap(),
            DisplayZone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap())
        );
        assert!("Mars/Olympus".parse::<DisplayZone>().is_err());
    }
}
