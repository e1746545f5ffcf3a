use chrono::{Local, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountdownParts {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl CountdownParts {
    pub fn is_over(&self) -> bool {
        *self == CountdownParts::default()
    }
}

/// Time left until the event, in the event's local time.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    target: NaiveDateTime,
}

impl Countdown {
    pub fn new(target: NaiveDateTime) -> Self {
        Countdown { target }
    }

    pub fn parts(&self) -> CountdownParts {
        self.parts_at(Local::now().naive_local())
    }

    // All parts are zero once the event has started
    pub fn parts_at(&self, now: NaiveDateTime) -> CountdownParts {
        let millis = (self.target - now).num_milliseconds();
        if millis <= 0 {
            return CountdownParts::default();
        }
        let seconds = millis / 1000;
        CountdownParts {
            days: seconds / 86_400,
            hours: (seconds % 86_400) / 3_600,
            minutes: (seconds % 3_600) / 60,
            seconds: seconds % 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_event_date;

    #[test]
    fn splits_remaining_time() {
        let countdown = Countdown::new(parse_event_date("2026-01-25T00:00:00").unwrap());
        let now = parse_event_date("2026-01-23 21:58:30").unwrap();
        assert_eq!(
            countdown.parts_at(now),
            CountdownParts {
                days: 1,
                hours: 2,
                minutes: 1,
                seconds: 30
            }
        );
    }

    #[test]
    fn past_events_show_zero() {
        let countdown = Countdown::new(parse_event_date("2026-01-25").unwrap());
        let later = parse_event_date("2026-02-01").unwrap();
        assert!(countdown.parts_at(later).is_over());
        assert!(countdown.parts_at(parse_event_date("2026-01-25").unwrap()).is_over());
    }
}
