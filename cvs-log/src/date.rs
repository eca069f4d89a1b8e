use chrono::NaiveDate;
use regex::Regex;

/// Recogniser for the timestamp formats that show up in `cvs log` output and
/// on the command line: `2003/03/13 00:18:20`, `2003-03-13 00:18:20 +0500`,
/// and a bare epoch-seconds integer (the form the cache file stores).
///
/// Times without an explicit offset are interpreted as UTC. Timestamps are
/// signed seconds throughout; dates before the epoch are representable.
pub struct DateParser {
    re: Regex,
}

impl DateParser {
    pub fn new() -> Self {
        Self {
            re: Regex::new(
                r"([0-9]{4})[-/]([0-9]{2})[-/]([0-9]{2})[ T]([0-9]{2}):([0-9]{2}):([0-9]{2})( [-+][0-9]{4})?",
            )
            .unwrap(),
        }
    }

    pub fn parse(&self, input: &str) -> Option<i64> {
        let captures = match self.re.captures(input) {
            Some(captures) => captures,
            None => return input.trim().parse::<i64>().ok(),
        };

        let field = |i: usize| captures.get(i).unwrap().as_str();

        let date = NaiveDate::from_ymd_opt(
            field(1).parse().ok()?,
            field(2).parse().ok()?,
            field(3).parse().ok()?,
        )?;
        let time = date.and_hms_opt(
            field(4).parse().ok()?,
            field(5).parse().ok()?,
            field(6).parse().ok()?,
        )?;

        let offset = match captures.get(7) {
            Some(tz) => {
                let tz = tz.as_str().trim();
                let sign = if tz.starts_with('-') { -1 } else { 1 };
                let hours: i64 = tz[1..3].parse().ok()?;
                let minutes: i64 = tz[3..5].parse().ok()?;
                sign * (hours * 3600 + minutes * 60)
            }
            None => 0,
        };

        Some(time.timestamp() - offset)
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_formats() {
        let parser = DateParser::new();

        // Both separators, with and without an offset.
        assert_eq!(parser.parse("2003/03/13 00:18:20"), Some(1047514700));
        assert_eq!(parser.parse("2003-03-13 00:18:20"), Some(1047514700));
        assert_eq!(
            parser.parse("2003-03-13 00:18:20 +0000"),
            Some(1047514700)
        );
        assert_eq!(
            parser.parse("2003-03-13 05:18:20 +0500"),
            Some(1047514700)
        );
        assert_eq!(
            parser.parse("2003-03-12 19:18:20 -0500"),
            Some(1047514700)
        );
    }

    #[test]
    fn test_epoch_fallback() {
        let parser = DateParser::new();

        assert_eq!(parser.parse("1047514700"), Some(1047514700));
        assert_eq!(parser.parse("-10"), Some(-10));
        assert_eq!(parser.parse("yesterday"), None);
    }
}
