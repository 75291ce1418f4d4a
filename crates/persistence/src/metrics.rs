//! Store latency and pool gauges for the postgres backend.

use std::time::Instant;

use metrics::{gauge, histogram};
use sqlx::PgPool;

/// Measures one repository statement.
///
/// Dropping the timer without calling `finish` records nothing, so an early
/// `?` return does not skew the histogram.
pub struct QueryTimer {
    statement: &'static str,
    started: Instant,
}

impl QueryTimer {
    pub fn start(statement: &'static str) -> Self {
        Self {
            statement,
            started: Instant::now(),
        }
    }

    pub fn finish(self) {
        histogram!("home_alarm_store_query_seconds", "statement" => self.statement)
            .record(self.started.elapsed().as_secs_f64());
    }
}

/// Publishes in-use, idle and total connection counts of `pool`.
pub fn observe_pool(pool: &PgPool) {
    let total = pool.size() as f64;
    let idle = pool.num_idle() as f64;
    gauge!("home_alarm_store_connections", "state" => "in_use").set((total - idle).max(0.0));
    gauge!("home_alarm_store_connections", "state" => "idle").set(idle);
    gauge!("home_alarm_store_connections", "state" => "total").set(total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_keeps_statement_label() {
        let timer = QueryTimer::start("load_home_alarm");
        assert_eq!(timer.statement, "load_home_alarm");
        timer.finish();
    }
}
