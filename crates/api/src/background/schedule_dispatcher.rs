//! Minute-aligned dispatcher for time-based lock schedules.
//!
//! On each tick the current wall-clock minute is computed in the configured
//! time zone and every enabled schedule due in that minute gets its command
//! relayed to the device's channel. A minute is dispatched at most once even
//! if the tick period is shorter than a minute or the clock jitters. Minutes
//! skipped by a forward clock step are caught up, up to [`MAX_CATCH_UP`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use latchkey_core::protocol::OutboundFrame;
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::schedule::ScheduleSlot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleConfig;
use crate::relay::MessageRouter;

/// Most minutes dispatched by a single tick after the wall clock jumps ahead.
pub const MAX_CATCH_UP: i64 = 5;

pub struct ScheduleDispatcher {
    registry: Arc<dyn DeviceRegistry>,
    router: Arc<MessageRouter>,
    timezone: Tz,
    period: Duration,
    /// Start of the last minute dispatched, in UTC.
    last_minute: Option<DateTime<Utc>>,
}

impl ScheduleDispatcher {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        router: Arc<MessageRouter>,
        config: &ScheduleConfig,
    ) -> Self {
        Self {
            registry,
            router,
            timezone: config.timezone,
            period: config.tick,
            last_minute: None,
        }
    }

    /// Run the dispatch loop until `cancel` is triggered.
    ///
    /// The first tick lands on the next minute boundary. Ticks missed while a
    /// dispatch is still running are skipped, never bunched.
    pub async fn run(mut self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + delay_until_next_minute(Utc::now());
        let mut interval = tokio::time::interval_at(start, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            timezone = %self.timezone,
            period_secs = self.period.as_secs(),
            "Schedule dispatcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Schedule dispatcher stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick_at(Utc::now()).await {
                        tracing::error!(error = %e, "Schedule dispatch failed");
                    }
                }
            }
        }
    }

    /// Dispatch every schedule due in the minute containing `now`, plus any
    /// minutes skipped since the previous dispatch (at most
    /// [`MAX_CATCH_UP`] minutes in total).
    ///
    /// Returns how many schedules fired. A minute that was already
    /// dispatched returns `Ok(0)` without querying the registry, and so does
    /// a small backward clock step. On error the failed minute stays
    /// pending for the next tick.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<usize, RegistryError> {
        let current = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
        let catch_up = TimeDelta::minutes(MAX_CATCH_UP);

        let first = match self.last_minute {
            None => current,
            Some(last) if current <= last => {
                if last - current <= catch_up {
                    tracing::debug!(minute = %current, "Minute already dispatched");
                    return Ok(0);
                }
                tracing::warn!(from = %last, to = %current, "Wall clock moved backwards");
                current
            }
            Some(last) => {
                let oldest = current - catch_up + TimeDelta::minutes(1);
                let next = last + TimeDelta::minutes(1);
                if next < oldest {
                    tracing::warn!(
                        from = %last,
                        to = %current,
                        "Wall clock jumped ahead, older minutes dropped"
                    );
                }
                next.max(oldest)
            }
        };

        let mut fired = 0;
        let mut minute = first;
        while minute <= current {
            fired += self.dispatch_minute(minute).await?;
            self.last_minute = Some(minute);
            minute += TimeDelta::minutes(1);
        }
        Ok(fired)
    }

    async fn dispatch_minute(&self, minute: DateTime<Utc>) -> Result<usize, RegistryError> {
        let slot = ScheduleSlot::of(&minute.with_timezone(&self.timezone));
        let due = self.registry.list_due_schedules(&slot).await?;

        for entry in &due {
            let command = entry.schedule_type.command();
            let delivered = self.router.relay(
                &entry.channel_key(),
                &OutboundFrame::Command { command },
                None,
            );
            tracing::info!(
                schedule_id = entry.id,
                device_id = %entry.device_id,
                command = command.as_str(),
                slot = %slot,
                delivered,
                "Dispatched scheduled command"
            );
        }

        if due.is_empty() {
            tracing::trace!(slot = %slot, "No schedules due");
        }
        Ok(due.len())
    }
}

/// Time from `now` to the start of the next wall-clock minute.
fn delay_until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = Duration::new(
        u64::from(now.second()),
        now.nanosecond() % 1_000_000_000,
    );
    Duration::from_secs(60).saturating_sub(into_minute)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn delay_reaches_next_minute_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 45).unwrap();
        assert_eq!(delay_until_next_minute(now), Duration::from_secs(15));

        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 8, 1, 0).unwrap();
        assert_eq!(delay_until_next_minute(on_boundary), Duration::from_secs(60));
    }
}
