/// Time utilities for the KRX session (Asia/Seoul)
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;

/// Current wall-clock time in KST
pub fn now_kst() -> DateTime<Tz> {
    Utc::now().with_timezone(&Seoul)
}

/// Interpret an exchange-local timestamp as KST and convert to UTC
pub fn kst_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    match Seoul.from_local_datetime(&local).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Seoul has no DST gaps; fixed +09:00 is exact
        None => Utc.from_utc_datetime(&(local - Duration::hours(9))),
    }
}

/// Parse a vendor `YYYYMMDD` date
pub fn parse_vendor_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

/// Parse a vendor `HHMMSS` time-of-day
pub fn parse_vendor_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H%M%S").ok()
}

pub fn format_vendor_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn format_vendor_time(time: NaiveTime) -> String {
    time.format("%H%M%S").to_string()
}

/// Monday to Friday (holidays are not modelled)
pub fn is_trading_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Regular session hours, exchange-local
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl SessionHours {
    /// KRX regular session: 09:00 to 15:30 KST
    pub fn krx() -> Self {
        SessionHours {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl Default for SessionHours {
    fn default() -> Self {
        SessionHours::krx()
    }
}
