//! Holiday table scraping
//!
//! Holiday pages publish a table whose rows carry a `data-date` attribute and
//! one or more name cells identified by their class, e.g.
//!
//! ```html
//! <tr data-date="2024-12-25"><td class="name">Christmas Day</td></tr>
//! ```
//!
//! A row with a bad date is skipped; it never aborts the rest of the table.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::{HolidayRecord, NormalizeError};

/// Cell classes read as holiday names when the source does not override them
pub const DEFAULT_HOLIDAY_CELLS: &[&str] = &["name", "holiday", "observance"];

static RE_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<table\b").unwrap());
static RE_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b([^>]*)>(.*?)</tr\s*>").unwrap());
static RE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t([dh])\b([^>]*)>(.*?)</t[dh]\s*>").unwrap());
static RE_DATE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bdata-date\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static RE_CLASS_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Parses every dated row of the document's holiday table
///
/// Emits one `HolidayRecord` per (row, name cell) pair. Returns
/// `NotATable` when there is no table at all and `NoDatedRows` when the
/// table has no row carrying a date. When rows are dated but none of the
/// dates can be read the result is `NoUsableRows`, so a changed date format
/// is reported instead of looking like a table with zero holidays.
pub fn parse_holidays(html: &str, cells: &[&str]) -> Result<Vec<HolidayRecord>, NormalizeError> {
    if html.trim().is_empty() {
        return Err(NormalizeError::EmptyBody);
    }
    if !RE_TABLE.is_match(html) {
        return Err(NormalizeError::NotATable);
    }

    let mut holidays = Vec::new();
    let mut dated_rows = 0usize;
    let mut usable_rows = 0usize;

    for row in RE_ROW.captures_iter(html) {
        let attrs = &row[1];
        let Some(raw_date) = attribute(&RE_DATE_ATTR, attrs) else {
            continue;
        };
        dated_rows += 1;

        let Some(date) = parse_row_date(raw_date) else {
            warn!(date = %raw_date, "skipping holiday row with unparseable date");
            continue;
        };
        usable_rows += 1;

        for cell in RE_CELL.captures_iter(&row[2]) {
            let is_name_cell = attribute(&RE_CLASS_ATTR, &cell[2])
                .map(|classes| classes.split_whitespace().any(|c| cells.contains(&c)))
                .unwrap_or(false);
            if !is_name_cell {
                continue;
            }

            let name = cell_text(&cell[3]);
            if !name.is_empty() {
                holidays.push(HolidayRecord { name, date });
            }
        }
    }

    if dated_rows == 0 {
        return Err(NormalizeError::NoDatedRows);
    }
    if usable_rows == 0 {
        return Err(NormalizeError::NoUsableRows(dated_rows));
    }
    Ok(holidays)
}

fn attribute<'a>(re: &Regex, attrs: &'a str) -> Option<&'a str> {
    let caps = re.captures(attrs)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

/// Accepts an ISO date (optionally followed by a time) or epoch milliseconds
fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) && raw.len() > 8 {
        let millis: i64 = raw.parse().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive());
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Strips markup from a cell, decodes entities and collapses whitespace
fn cell_text(inner: &str) -> String {
    let without_tags = RE_TAGS.replace_all(inner, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}
