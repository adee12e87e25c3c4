use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Days,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::ingest::CellValue;

const TIMEZONE_CONFIG_FILE: &str =
  "docket-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DOCKET_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DOCKET_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "America/Sao_Paulo";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Calendar day of `now` in the
/// project timezone. Every due-date
/// comparison is made against this.
#[must_use]
pub fn project_today(
  now: DateTime<Utc>
) -> NaiveDate {
  now.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date.format("%d/%m/%Y").to_string()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
  {
    if let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    ) {
      return tz;
    }
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Resolves a raw due-date cell to a
/// calendar day.
///
/// Precedence: typed date, spreadsheet
/// serial day number, `YYYY-MM-DD`,
/// then `DD-MM-YYYY`. Both separators
/// `-` and `/` are accepted. Day/month
/// order is always read day-first, so
/// `03/04/2026` is the 3rd of April
/// even when the author meant March 4.
#[tracing::instrument(level = "trace")]
pub fn parse_due_date(
  cell: &CellValue
) -> Option<NaiveDate> {
  match cell {
    | CellValue::Date(date) => {
      Some(*date)
    }
    | CellValue::Number(value) => {
      serial_to_date(*value)
    }
    | CellValue::Text(text) => {
      parse_due_text(text)
    }
    | CellValue::Bool(_)
    | CellValue::Empty => None
  }
}

/// Day numbers count from 1899-12-30,
/// the epoch used by spreadsheet
/// engines that carry the 1900 leap
/// year quirk. Fractions (time of
/// day) are truncated.
#[must_use]
pub fn serial_to_date(
  value: f64
) -> Option<NaiveDate> {
  if !value.is_finite()
    || value <= 0.0
    || value > f64::from(u32::MAX)
  {
    return None;
  }
  let epoch =
    NaiveDate::from_ymd_opt(
      1899, 12, 30
    )?;
  epoch.checked_add_days(Days::new(
    value.trunc() as u64
  ))
}

#[must_use]
pub fn parse_due_text(
  raw: &str
) -> Option<NaiveDate> {
  let text = raw.trim();
  if text.is_empty() {
    return None;
  }

  let year_first = Regex::new(
    r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})$"
  )
  .ok()?;
  if let Some(caps) =
    year_first.captures(text)
  {
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    return NaiveDate::from_ymd_opt(
      year, month, day
    );
  }

  let year_last = Regex::new(
    r"^(\d{1,2})[-/](\d{1,2})[-/](\d{4})$"
  )
  .ok()?;
  if let Some(caps) =
    year_last.captures(text)
  {
    let first: u32 =
      caps[1].parse().ok()?;
    let second: u32 =
      caps[2].parse().ok()?;
    let year: i32 =
      caps[3].parse().ok()?;
    // A first group above 12 can only
    // be a day. At or below 12 the
    // order is ambiguous and is still
    // read day-first.
    let (day, month) = (first, second);
    return NaiveDate::from_ymd_opt(
      year, month, day
    );
  }

  // Delimited files carry serial day
  // numbers as plain text.
  let serial =
    Regex::new(r"^\d+(?:\.\d+)?$").ok()?;
  if serial.is_match(text) {
    return serial_to_date(
      text.parse().ok()?
    );
  }

  None
}

/// Signed count of weekdays between
/// `today` and `due`. Today itself is
/// never counted. Forward, the due day
/// is counted; backward, only the days
/// strictly between are, so past dates
/// yield negative counts.
#[must_use]
pub fn workdays_until(
  today: NaiveDate,
  due: NaiveDate
) -> i64 {
  if due == today {
    return 0;
  }
  if due > today {
    return weekdays_after(today, due);
  }

  // Backward walk visits (due, today).
  match today.pred_opt() {
    | Some(yesterday) => {
      -weekdays_after(due, yesterday)
    }
    | None => 0
  }
}

/// Weekdays in the half-open range
/// `(start, end]`.
fn weekdays_after(
  start: NaiveDate,
  end: NaiveDate
) -> i64 {
  let span =
    (end - start).num_days();
  if span <= 0 {
    return 0;
  }
  let full_weeks = span / 7;
  let mut count = full_weeks * 5;
  let mut cursor = start
    + chrono::Duration::days(
      full_weeks * 7
    );
  while cursor < end {
    cursor = match cursor.succ_opt() {
      | Some(next) => next,
      | None => break
    };
    if !matches!(
      cursor.weekday(),
      Weekday::Sat | Weekday::Sun
    ) {
      count += 1;
    }
  }
  count
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    format_due_date,
    parse_due_date,
    parse_due_text,
    serial_to_date,
    workdays_until
  };
  use crate::ingest::CellValue;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_year_first_text() {
    for (raw, expected) in [
      ("2026-03-09", day(2026, 3, 9)),
      ("2026/3/9", day(2026, 3, 9)),
      ("1999-12-31", day(1999, 12, 31)),
      (" 2024-02-29 ", day(2024, 2, 29))
    ] {
      assert_eq!(
        parse_due_text(raw),
        Some(expected),
        "{raw}"
      );
    }
  }

  #[test]
  fn day_first_when_first_group_exceeds_twelve()
   {
    assert_eq!(
      parse_due_text("25/12/2026"),
      Some(day(2026, 12, 25))
    );
    assert_eq!(
      parse_due_text("13-01-2027"),
      Some(day(2027, 1, 13))
    );
  }

  #[test]
  fn ambiguous_text_is_read_day_first()
   {
    assert_eq!(
      parse_due_text("03/04/2026"),
      Some(day(2026, 4, 3))
    );
  }

  #[test]
  fn rejects_malformed_or_impossible_text()
   {
    assert_eq!(parse_due_text(""), None);
    assert_eq!(
      parse_due_text("next week"),
      None
    );
    assert_eq!(
      parse_due_text("2026-13-01"),
      None
    );
    assert_eq!(
      parse_due_text("31/02/2026"),
      None
    );
    assert_eq!(
      parse_due_text("12/25/26"),
      None
    );
  }

  #[test]
  fn converts_serial_day_numbers() {
    assert_eq!(
      serial_to_date(1.0),
      Some(day(1899, 12, 31))
    );
    assert_eq!(
      serial_to_date(45658.75),
      Some(day(2025, 1, 1))
    );
    assert_eq!(serial_to_date(0.0), None);
    assert_eq!(
      serial_to_date(-3.0),
      None
    );
    assert_eq!(
      serial_to_date(f64::NAN),
      None
    );
  }

  #[test]
  fn typed_cells_take_precedence() {
    assert_eq!(
      parse_due_date(&CellValue::Date(
        day(2026, 5, 1)
      )),
      Some(day(2026, 5, 1))
    );
    assert_eq!(
      parse_due_date(&CellValue::Number(
        46023.0
      )),
      Some(day(2026, 1, 1))
    );
    assert_eq!(
      parse_due_date(&CellValue::Empty),
      None
    );
    assert_eq!(
      parse_due_date(&CellValue::Bool(
        true
      )),
      None
    );
  }

  #[test]
  fn numeric_text_is_a_serial_day() {
    assert_eq!(
      parse_due_text("45658"),
      Some(day(2025, 1, 1))
    );
    assert_eq!(
      parse_due_text(" 46023.75 "),
      Some(day(2026, 1, 1))
    );
    assert_eq!(
      parse_due_date(&CellValue::Text(
        "46023".to_string()
      )),
      Some(day(2026, 1, 1))
    );
    assert_eq!(parse_due_text("0"), None);
    assert_eq!(parse_due_text("-5"), None);
    assert_eq!(parse_due_text("12a"), None);
  }

  #[test]
  fn workdays_zero_for_today() {
    let wednesday = day(2026, 10, 14);
    assert_eq!(
      workdays_until(
        wednesday, wednesday
      ),
      0
    );
  }

  #[test]
  fn workdays_skip_weekend_forward() {
    let wednesday = day(2026, 10, 14);
    // Thu, Fri, Mon.
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 10, 19)
      ),
      3
    );
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 10, 17)
      ),
      2
    );
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 11, 13)
      ),
      22
    );
  }

  #[test]
  fn workdays_count_backward_as_negative()
   {
    let wednesday = day(2026, 10, 14);
    // Mon and Tue; the Friday itself is
    // not counted.
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 10, 9)
      ),
      -2
    );
    let tuesday = day(2026, 10, 13);
    assert_eq!(
      workdays_until(
        tuesday,
        day(2026, 10, 9)
      ),
      -1
    );
    let monday = day(2026, 10, 12);
    assert_eq!(
      workdays_until(
        monday,
        day(2026, 10, 9)
      ),
      0
    );
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 10, 12)
      ),
      -1
    );
    // Weekend days are never counted.
    assert_eq!(
      workdays_until(
        monday,
        day(2026, 10, 10)
      ),
      0
    );
    assert_eq!(
      workdays_until(
        wednesday,
        day(2026, 10, 7)
      ),
      -4
    );
  }

  #[test]
  fn workdays_cross_year_boundary() {
    assert_eq!(
      workdays_until(
        day(2025, 12, 31),
        day(2026, 1, 2)
      ),
      2
    );
    assert_eq!(
      workdays_until(
        day(2026, 1, 2),
        day(2025, 12, 31)
      ),
      -1
    );
    assert_eq!(
      workdays_until(
        day(2024, 2, 28),
        day(2024, 3, 1)
      ),
      2
    );
  }

  #[test]
  fn formats_day_first() {
    assert_eq!(
      format_due_date(day(2026, 3, 9)),
      "09/03/2026"
    );
  }
}

/// Stores optional due dates as
/// `YYYY-MM-DD` strings.
pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format(FORMAT)
            .to_string()
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt {
      | Some(raw) => {
        NaiveDate::parse_from_str(
          &raw, FORMAT
        )
        .map(Some)
        .map_err(
          serde::de::Error::custom
        )
      }
      | None => Ok(None)
    }
  }
}
