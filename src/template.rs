//! Template Engine (spec §4.C): `{{field}}` substitution plus a Moment.js-like
//! `{{date:FORMAT}}`/`{{fecha:FORMAT}}` subset with Spanish month/weekday
//! names, grounded in `_process_date_placeholders` from the prior
//! implementation this crate's vault-write path is patterned on.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

const MONTHS_ES: [&str; 12] = [
    "Enero", "Febrero", "Marzo", "Abril", "Mayo", "Junio", "Julio", "Agosto", "Septiembre",
    "Octubre", "Noviembre", "Diciembre",
];
const MONTHS_ES_SHORT: [&str; 12] = [
    "Ene", "Feb", "Mar", "Abr", "May", "Jun", "Jul", "Ago", "Sep", "Oct", "Nov", "Dic",
];
const WEEKDAYS_ES: [&str; 7] = [
    "Lunes", "Martes", "Miércoles", "Jueves", "Viernes", "Sábado", "Domingo",
];
const WEEKDAYS_ES_SHORT: [&str; 7] = ["Lun", "Mar", "Mié", "Jue", "Vie", "Sáb", "Dom"];

/// A civil (Gregorian) date, independent of timezone — the callers of this
/// engine only ever need calendar-date formatting, never wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilDate {
    pub year: i32,
    pub month: u32,  // 1-12
    pub day: u32,    // 1-31
    pub weekday: u32, // 0=Monday .. 6=Sunday, ISO order to match WEEKDAYS_ES
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CivilDate {
    /// Derive today's date (UTC) from the system clock. Kept as the single
    /// call site that touches `SystemTime` so the rest of this module is
    /// pure and testable against fixed dates.
    pub fn now_utc() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::from_unix_secs(secs)
    }

    pub fn from_unix_secs(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let time_of_day = secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        // 1970-01-01 was a Thursday = weekday index 3 (Mon=0).
        let weekday = (((days % 7) + 3 + 7) % 7) as u32;
        Self {
            year,
            month,
            day,
            weekday,
            hour: (time_of_day / 3600) as u32,
            minute: ((time_of_day % 3600) / 60) as u32,
            second: (time_of_day % 60) as u32,
        }
    }

    pub fn ymd(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Howard Hinnant's days-from-civil algorithm, run in reverse: convert a
/// day count since the epoch into (year, month, day).
fn civil_from_days(z: i64) -> (i32, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

/// Expand a Moment.js-like format string against `date`, substituting tokens
/// longest-first so e.g. `MMMM` isn't partially consumed by an `MM` rule.
pub fn format_date(date: &CivilDate, format: &str) -> String {
    // Ordered longest-first; ties broken by spec table order.
    const TOKENS: &[&str] = &[
        "YYYY", "MMMM", "dddd", "MMM", "ddd", "YY", "MM", "DD", "HH", "mm", "ss", "M", "D",
    ];

    let mut result = String::new();
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;
    'outer: while i < chars.len() {
        for token in TOKENS {
            let tlen = token.chars().count();
            if i + tlen <= chars.len() && chars[i..i + tlen].iter().collect::<String>() == **token
            {
                result.push_str(&substitute_token(date, token));
                i += tlen;
                continue 'outer;
            }
        }
        result.push(chars[i]);
        i += 1;
    }
    result
}

fn substitute_token(date: &CivilDate, token: &str) -> String {
    match token {
        "YYYY" => format!("{:04}", date.year),
        "YY" => format!("{:02}", date.year % 100),
        "MMMM" => MONTHS_ES[(date.month - 1) as usize].to_string(),
        "MMM" => MONTHS_ES_SHORT[(date.month - 1) as usize].to_string(),
        "MM" => format!("{:02}", date.month),
        "M" => date.month.to_string(),
        "DD" => format!("{:02}", date.day),
        "D" => date.day.to_string(),
        "dddd" => WEEKDAYS_ES[date.weekday as usize].to_string(),
        "ddd" => WEEKDAYS_ES_SHORT[date.weekday as usize].to_string(),
        "HH" => format!("{:02}", date.hour),
        "mm" => format!("{:02}", date.minute),
        "ss" => format!("{:02}", date.second),
        _ => token.to_string(),
    }
}

fn date_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(?:date|fecha)(?::([^}]*))?\}\}").unwrap())
}

fn created_updated_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(created|updated):\s*YYYY-MM-DD\s*$").unwrap())
}

/// Expand `{{field}}` placeholders from caller-supplied values, then
/// `{{date[:FORMAT]}}`/`{{fecha[:FORMAT]}}`, then the `created:`/`updated:`
/// literal substitution — in that order, per spec §4.C.
pub fn expand(text: &str, values: &HashMap<String, String>, date: &CivilDate) -> String {
    let mut out = text.to_string();
    for (field, value) in values {
        out = out.replace(&format!("{{{{{field}}}}}"), value);
    }

    let out = date_token_re()
        .replace_all(&out, |caps: &regex::Captures| match caps.get(1) {
            Some(fmt) => format_date(date, fmt.as_str()),
            None => date.ymd(),
        })
        .into_owned();

    created_updated_literal_re()
        .replace_all(&out, |caps: &regex::Captures| format!("{}: {}", &caps[1], date.ymd()))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday_2024_06_03() -> CivilDate {
        CivilDate {
            year: 2024,
            month: 6,
            day: 3,
            weekday: 0,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    #[test]
    fn civil_date_matches_known_epoch_day() {
        // 2024-06-03 00:00:00 UTC
        let secs: u64 = 1_717_372_800;
        let d = CivilDate::from_unix_secs(secs);
        assert_eq!((d.year, d.month, d.day), (2024, 6, 3));
        assert_eq!(d.weekday, 0, "2024-06-03 is a Monday");
    }

    #[test]
    fn template_expansion_scenario_from_spec() {
        let template = "# {{title}}\ncreated: {{date:YYYY-MM-DD}}\nday: {{date:dddd}}\n";
        let mut values = HashMap::new();
        values.insert("title".to_string(), "Today".to_string());
        let expanded = expand(template, &values, &monday_2024_06_03());
        assert_eq!(expanded, "# Today\ncreated: 2024-06-03\nday: Lunes\n");
    }

    #[test]
    fn bare_date_token_uses_ymd() {
        let expanded = expand("{{date}}", &HashMap::new(), &monday_2024_06_03());
        assert_eq!(expanded, "2024-06-03");
    }

    #[test]
    fn created_literal_substitution() {
        let text = "created: YYYY-MM-DD\nupdated: YYYY-MM-DD\n";
        let expanded = expand(text, &HashMap::new(), &monday_2024_06_03());
        assert_eq!(expanded, "created: 2024-06-03\nupdated: 2024-06-03\n");
    }

    #[test]
    fn longest_first_token_order() {
        // MMMM must not be swallowed as MM + MM.
        let expanded = format_date(&monday_2024_06_03(), "MMMM (MM)");
        assert_eq!(expanded, "Junio (06)");
    }
}
