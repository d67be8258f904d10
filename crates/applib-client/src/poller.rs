//! Recurring query.

use crate::config::PollConfig;
use applib_core::Request;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// A request issued every `interval` and again whenever the connection opens.
#[derive(Debug, Clone, PartialEq)]
pub struct Poller {
    request: Request,
    interval: Duration,
}

impl Poller {
    pub fn new(request: Request, interval: Duration) -> Self {
        Self { request, interval }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(
            Request::query_constant(&config.query, &config.callback),
            config.interval(),
        )
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks once per interval, starting one interval from now. Late ticks
    /// are not bunched up.
    pub fn ticker(&self) -> Interval {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_a_full_interval() {
        let poller = Poller::new(Request::query_constant("select 1;", "cb"), Duration::from_secs(5));
        let start = Instant::now();
        let mut ticker = poller.ticker();

        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn built_from_config() {
        let poller = Poller::from_config(&PollConfig::default());
        assert_eq!(poller.interval(), Duration::from_millis(5000));
        assert!(matches!(
            poller.request(),
            Request::DbQueryConstant { callback, .. } if callback == "show_posrep"
        ));
    }
}
