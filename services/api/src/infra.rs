use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Midday UTC on `date`, the instant the CLI commands evaluate against.
pub(crate) fn midday(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .map(|at| at.and_utc())
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(
            parse_date(" 2025-04-01 "),
            Ok(NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date"))
        );
        assert!(parse_date("01/04/2025").is_err());
    }

    #[test]
    fn midday_is_noon_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date");
        assert_eq!(midday(date).to_rfc3339(), "2025-04-01T12:00:00+00:00");
    }
}
