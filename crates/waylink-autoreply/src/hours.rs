// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-hours evaluation in the policy's timezone.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tracing::warn;
use waylink_core::types::WeeklyHours;

/// Whether `now` falls inside the configured window for its weekday,
/// evaluated in the policy timezone. Days with no window are outside
/// hours. The window is inclusive at both edges.
///
/// An unparseable timezone falls back to UTC with a warning rather than
/// disabling the policy.
pub fn within_hours(hours: &WeeklyHours, timezone: &str, now: DateTime<Utc>) -> bool {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone, "unknown policy timezone, evaluating in UTC");
            chrono_tz::UTC
        }
    };
    let local = now.with_timezone(&tz);
    let Some(window) = hours.window_for(local.weekday()) else {
        return false;
    };
    let time = local.time();
    time >= window.open && time <= window.close
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};
    use waylink_core::types::DayWindow;

    fn monday_nine_to_six() -> WeeklyHours {
        let mut hours = WeeklyHours::default();
        hours.set(
            Weekday::Mon,
            Some(DayWindow {
                open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            }),
        );
        hours
    }

    /// 2026-08-03 is a Monday. Berlin is UTC+2 in August.
    fn berlin_monday(hour: u32, minute: u32) -> DateTime<Utc> {
        chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2026, 8, 3, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn true_at_open_boundary() {
        let hours = monday_nine_to_six();
        assert!(within_hours(&hours, "Europe/Berlin", berlin_monday(9, 0)));
    }

    #[test]
    fn false_after_close() {
        let hours = monday_nine_to_six();
        assert!(!within_hours(&hours, "Europe/Berlin", berlin_monday(18, 1)));
    }

    #[test]
    fn true_inside_window_false_before_open() {
        let hours = monday_nine_to_six();
        assert!(within_hours(&hours, "Europe/Berlin", berlin_monday(12, 30)));
        assert!(!within_hours(&hours, "Europe/Berlin", berlin_monday(8, 59)));
    }

    #[test]
    fn false_on_day_without_window() {
        let hours = monday_nine_to_six();
        // 2026-08-04 is a Tuesday.
        let tuesday = chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2026, 8, 4, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!within_hours(&hours, "Europe/Berlin", tuesday));
    }

    #[test]
    fn timezone_shifts_the_window() {
        let hours = monday_nine_to_six();
        // 08:00 Berlin local on Monday = 06:00 UTC. In UTC that instant
        // is outside the window; interpreted as Berlin it is too.
        let before_open = berlin_monday(8, 0);
        assert!(!within_hours(&hours, "Europe/Berlin", before_open));

        // 09:30 Berlin = 07:30 UTC: inside for Berlin, outside for UTC.
        let inside_berlin = berlin_monday(9, 30);
        assert!(within_hours(&hours, "Europe/Berlin", inside_berlin));
        assert!(!within_hours(&hours, "UTC", inside_berlin));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let hours = monday_nine_to_six();
        // Monday 2026-08-03 10:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        assert!(within_hours(&hours, "Not/AZone", now));
    }
}
