//! Database metrics.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

pub fn record_query_duration(query: &'static str, duration_secs: f64) {
    histogram!("guestbook_db_query_duration_seconds", "query" => query).record(duration_secs);
}

/// Publishes pool occupancy gauges. Called periodically from the server.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();

    gauge!("guestbook_db_connections_active").set(size.saturating_sub(idle) as f64);
    gauge!("guestbook_db_connections_idle").set(idle as f64);
    gauge!("guestbook_db_connections_total").set(size as f64);
}

/// Times one store query; call [`QueryTimer::record`] when it returns.
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        record_query_duration(self.query, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_keeps_name() {
        let timer = QueryTimer::new("wish_try_create");
        assert_eq!(timer.query, "wish_try_create");
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        QueryTimer::new("wish_find_by_key").record();
    }
}
