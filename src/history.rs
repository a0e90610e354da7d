//! Progress history: speed, ETA and recent activity.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a template at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub datetime: DateTime<Utc>,
    pub progress: i64,
}

impl ProgressRecord {
    pub fn new(datetime: DateTime<Utc>, progress: i64) -> Self {
        Self { datetime, progress }
    }
}

/// Speed in pixels per hour between two records, `None` when they share a
/// timestamp.
pub fn speed(newer: &ProgressRecord, older: &ProgressRecord) -> Option<f64> {
    let elapsed = newer.datetime - older.datetime;
    if elapsed == Duration::zero() {
        return None;
    }
    let hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;
    Some((newer.progress - older.progress) as f64 / hours)
}

/// Estimated time until a template is finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    /// Nothing left to place
    Done,
    /// Not enough history to tell
    Unknown,
    /// Work is left but the template is not moving forward
    Never,
    /// At `speed` px/h the template finishes after `duration`. A negative
    /// duration means it overshot and would have finished that long ago.
    Remaining { duration: Duration, speed: f64 },
}

impl Eta {
    /// Estimate from the remaining cell count and two records: the latest
    /// one and one from the start of the window.
    pub fn estimate(remaining: i64, latest: Option<&ProgressRecord>, past: Option<&ProgressRecord>) -> Eta {
        if remaining == 0 {
            return Eta::Done;
        }
        let Some(speed) = latest.zip(past).and_then(|(latest, past)| speed(latest, past)) else {
            return Eta::Unknown;
        };
        if remaining > 0 && speed <= 0.0 {
            return Eta::Never;
        }
        if speed == 0.0 {
            return Eta::Unknown;
        }
        let hours = remaining as f64 / speed.abs();
        let duration = Duration::milliseconds((hours * 3_600_000.0).round() as i64);
        Eta::Remaining { duration, speed }
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Done => write!(f, "done"),
            Eta::Unknown => write!(f, "unknown"),
            Eta::Never => write!(f, "never"),
            Eta::Remaining { duration, speed } => {
                let (sign, d) = if *duration < Duration::zero() { ("-", -*duration) } else { ("", *duration) };
                write!(
                    f,
                    "{}{}d {}h {}m (at {:.1} px/h)",
                    sign,
                    d.num_days(),
                    d.num_hours() % 24,
                    d.num_minutes() % 60,
                    speed
                )
            }
        }
    }
}

/// The activity windows reported for a template.
pub const TIMEFRAMES: [(&str, i64); 5] = [
    ("5 minutes", 5),
    ("hour", 60),
    ("6 hours", 6 * 60),
    ("day", 24 * 60),
    ("week", 7 * 24 * 60),
];

/// Lookback used for the all-time average.
const ALL_TIME_DAYS: i64 = 9999;

/// Progress change over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowDelta {
    pub name: &'static str,
    /// Pixels gained, `None` without a record for the window start
    pub delta: Option<i64>,
}

/// Average speed since tracking started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageSpeed {
    pub per_day: f64,
    pub per_hour: f64,
}

/// Recent activity of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub last_updated: Option<DateTime<Utc>>,
    pub windows: Vec<WindowDelta>,
    pub average: Option<AverageSpeed>,
}

impl Activity {
    /// Build activity from a lookup returning the record nearest a moment.
    ///
    /// `now` is rounded down to 5 minutes, the cadence records are taken at.
    pub fn compute<E>(
        now: DateTime<Utc>,
        mut progress_at: impl FnMut(DateTime<Utc>) -> Result<Option<ProgressRecord>, E>,
    ) -> Result<Activity, E> {
        let now = round_down(now, Duration::minutes(5));
        let latest = progress_at(now)?;

        let mut windows = Vec::with_capacity(TIMEFRAMES.len());
        for (name, minutes) in TIMEFRAMES {
            let past = progress_at(now - Duration::minutes(minutes))?;
            let delta = latest.zip(past).map(|(l, p)| l.progress - p.progress);
            windows.push(WindowDelta { name, delta });
        }

        let oldest = progress_at(now - Duration::days(ALL_TIME_DAYS))?;
        let average = latest.zip(oldest).and_then(|(l, o)| {
            speed(&l, &o).map(|per_hour| AverageSpeed { per_day: per_hour * 24.0, per_hour })
        });

        Ok(Activity { last_updated: latest.map(|r| r.datetime), windows, average })
    }
}

/// Round a time down to a multiple of `step`.
pub fn round_down(t: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    t.duration_trunc(step).unwrap_or(t)
}
