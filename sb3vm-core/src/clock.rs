use chrono::{Datelike, Local, TimeZone, Timelike};

/// Logical frame clock. `now` accumulates every `update(dt)`; the project
/// timer runs on the same feed but can be zeroed by scripts.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameClock {
    now: f64,
    timer: f64,
}

impl FrameClock {
    pub fn advance(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        self.now += dt;
        self.timer += dt;
    }

    /// Seconds since runtime start; the base for every wait deadline.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn reset_timer(&mut self) {
        self.timer = 0.0;
    }
}

const MS_PER_DAY: f64 = 86_400_000.0;

/// Days since local midnight, Jan 1 2000, with DST correction: the raw
/// millisecond delta is adjusted by the difference in UTC offset between now
/// and the epoch so the result is stable across DST transitions.
pub fn days_since_2000() -> f64 {
    let now = Local::now();
    let epoch = match Local.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).earliest() {
        Some(e) => e,
        None => return 0.0,
    };
    let raw_ms = (now.timestamp_millis() - epoch.timestamp_millis()) as f64;
    let offset_now_min = f64::from(now.offset().local_minus_utc()) / 60.0;
    let offset_epoch_min = f64::from(epoch.offset().local_minus_utc()) / 60.0;
    // local_minus_utc is positive east; JS getTimezoneOffset is positive west.
    let dst_ms = (offset_epoch_min - offset_now_min) * 60_000.0;
    (raw_ms - dst_ms) / MS_PER_DAY
}

/// `current [menu]` reporter. Day of week is 1-based starting Sunday.
pub fn current_datum(menu: &str) -> f64 {
    let now = Local::now();
    match menu.to_lowercase().as_str() {
        "year" => f64::from(now.year()),
        "month" => f64::from(now.month()),
        "date" => f64::from(now.day()),
        "dayofweek" => f64::from(now.weekday().number_from_sunday()),
        "hour" => f64::from(now.hour()),
        "minute" => f64::from(now.minute()),
        "second" => f64::from(now.second()),
        _ => 0.0,
    }
}
