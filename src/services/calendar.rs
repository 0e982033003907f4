//! Calendar gate for the daily quota window.
//!
//! Quota windows roll over lazily: every quota-affecting call asks the gate
//! whether the stored reset date is still "today" in the provider's timezone.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use time::{Date, Duration, Month, OffsetDateTime, Time};

use crate::db::quota_repository::QuotaWindow;

/// True when the user's window was last reset on a different calendar day.
pub fn reset_due(last_reset: Date, today: Date) -> bool {
    last_reset != today
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderCalendar {
    tz: Tz,
}

impl ProviderCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn today(&self, now: OffsetDateTime) -> Date {
        naive_to_date(self.local_date(now)).unwrap_or_else(|| now.date())
    }

    pub fn window(&self, now: OffsetDateTime) -> QuotaWindow {
        let local = self.local_date(now);
        let starts_at = self
            .start_of_day(local)
            .unwrap_or_else(|| now.replace_time(Time::MIDNIGHT));
        let ends_at = local
            .succ_opt()
            .and_then(|next| self.start_of_day(next))
            .unwrap_or(starts_at + Duration::days(1));

        QuotaWindow {
            today: naive_to_date(local).unwrap_or_else(|| now.date()),
            starts_at,
            ends_at,
        }
    }

    fn local_date(&self, now: OffsetDateTime) -> NaiveDate {
        let utc = DateTime::<Utc>::from_timestamp(now.unix_timestamp(), now.nanosecond())
            .unwrap_or_default();
        utc.with_timezone(&self.tz).date_naive()
    }

    /// First existing local instant of `date`; skips a DST gap at midnight.
    fn start_of_day(&self, date: NaiveDate) -> Option<OffsetDateTime> {
        (0..3)
            .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
            .find_map(|naive| self.tz.from_local_datetime(&naive).earliest())
            .and_then(|local| OffsetDateTime::from_unix_timestamp(local.timestamp()).ok())
    }
}

fn naive_to_date(date: NaiveDate) -> Option<Date> {
    let month = Month::try_from(u8::try_from(date.month()).ok()?).ok()?;
    Date::from_calendar_date(date.year(), month, u8::try_from(date.day()).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn sao_paulo() -> ProviderCalendar {
        ProviderCalendar::new(chrono_tz::America::Sao_Paulo)
    }

    #[test]
    fn reset_is_due_only_on_a_new_day() {
        assert!(reset_due(date!(2024 - 05 - 08), date!(2024 - 05 - 09)));
        assert!(!reset_due(date!(2024 - 05 - 09), date!(2024 - 05 - 09)));
    }

    #[test]
    fn today_follows_provider_timezone() {
        // 02:00 UTC is still the previous evening in São Paulo (UTC-3)
        let now = datetime!(2024-05-10 02:00 UTC);
        assert_eq!(sao_paulo().today(now), date!(2024 - 05 - 09));
        assert_eq!(
            ProviderCalendar::new(chrono_tz::UTC).today(now),
            date!(2024 - 05 - 10)
        );
    }

    #[test]
    fn window_spans_the_local_day() {
        let window = sao_paulo().window(datetime!(2024-05-10 02:00 UTC));
        assert_eq!(window.today, date!(2024 - 05 - 09));
        assert_eq!(window.starts_at, datetime!(2024-05-09 03:00 UTC));
        assert_eq!(window.ends_at, datetime!(2024-05-10 03:00 UTC));
        assert!(window.contains(datetime!(2024-05-09 03:00 UTC)));
        assert!(!window.contains(datetime!(2024-05-10 03:00 UTC)));
    }
}
