use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use tokio::sync::mpsc;
use tracing::info;

use coffee_engine::ControlEvent;
use coffee_types::Clock;

/// First UTC midnight after today that falls on `weekday`.
pub fn next_round_at(now: DateTime<Utc>, weekday: Weekday) -> DateTime<Utc> {
    let today = now.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let ahead = (7 + target - today - 1) % 7 + 1;
    let date = now.date_naive() + Days::new(u64::from(ahead));
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Ask the control loop for a matching round every week. Announcements go
/// out `announce_after` the round.
///
/// The next round is never computed from before the last one, so a wall
/// clock that lags or steps back cannot run the same midnight twice.
pub async fn run_match_timer(
    control: mpsc::UnboundedSender<ControlEvent>,
    clock: Arc<dyn Clock>,
    weekday: Weekday,
    announce_after: chrono::Duration,
) {
    let mut last_round: Option<DateTime<Utc>> = None;
    loop {
        let now = clock.now();
        let round_at = next_round_at(last_round.map_or(now, |last| now.max(last)), weekday);
        info!("Next matching round at {}", round_at);
        tokio::time::sleep((round_at - now).to_std().unwrap_or_default()).await;

        let event = ControlEvent::MatchingRound {
            reminder_time: round_at + announce_after,
        };
        if control.send(event).is_err() {
            info!("Control loop is gone, match timer stopping");
            return;
        }
        last_round = Some(round_at);
    }
}
