use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Accepted deadline layouts, tried in order; the first full match wins.
/// All three are interpreted as UTC: the first two carry a literal `GMT`
/// zone and asctime carries no zone at all.
const ACCEPTED_LAYOUTS: &[&str] = &[
    // IMF-fixdate, the RFC 9110 preferred HTTP date: "Mon, 22 Jul 2024 20:10:00 GMT"
    "%a, %d %b %Y %H:%M:%S GMT",
    // Obsolete RFC 850 form, two-digit year: "Monday, 22-Jul-24 20:10:00 GMT"
    "%A, %d-%b-%y %H:%M:%S GMT",
    // ANSI C asctime(), day of month space-padded: "Mon Jul 22 20:10:00 2024"
    "%a %b %e %H:%M:%S %Y",
];

/// A deadline field was present on the request but carried no usable value.
///
/// The middleware maps both variants to the same `400 Bad Request`; the split
/// only exists for logging and tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidDeadline {
    #[error("deadline value is empty")]
    Empty,
    #[error("deadline value {0:?} matches no accepted date format")]
    Unparsable(String),
}

/// Parses a caller-supplied deadline string against the accepted layouts.
///
/// Trailing garbage fails a layout outright, and two-digit RFC 850 years
/// follow the POSIX pivot (69-99 are 19xx, 00-68 are 20xx).
pub fn parse_deadline(value: &str) -> Result<DateTime<Utc>, InvalidDeadline> {
    if value.is_empty() {
        return Err(InvalidDeadline::Empty);
    }
    for layout in ACCEPTED_LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(parsed.and_utc());
        }
    }
    Err(InvalidDeadline::Unparsable(value.to_owned()))
}
