//! Counts log events per severity.

use prometheus::{CounterVec, Opts};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const LOG_MESSAGES_NAME: &str = "log_messages";
pub const LOG_MESSAGES_HELP: &str = "Total number of log messages.";

/// Severities that are counted, with their exposed label value.
pub const COUNTED_LEVELS: [(Level, &str); 3] = [
    (Level::INFO, "info"),
    (Level::WARN, "warning"),
    (Level::ERROR, "error"),
];

/// Builds the `log_messages{level}` counter with every counted level
/// already present at zero.
pub(crate) fn new_log_counter() -> CounterVec {
    let counter = CounterVec::new(Opts::new(LOG_MESSAGES_NAME, LOG_MESSAGES_HELP), &["level"])
        .expect("Failed to create log_messages");
    for (_, label) in COUNTED_LEVELS {
        counter.with_label_values(&[label]);
    }
    counter
}

/// `tracing` layer incrementing `log_messages` once per info, warn or error
/// event. Obtain it from [`Metrics::log_layer`](super::Metrics::log_layer) and
/// hand it to the subscriber.
#[derive(Clone, Debug)]
pub struct LogCounterLayer {
    counter: CounterVec,
}

impl LogCounterLayer {
    pub(crate) fn new(counter: CounterVec) -> Self {
        LogCounterLayer { counter }
    }

    /// Records one event at `level`; other levels are ignored.
    pub fn record(&self, level: &Level) {
        if let Some((_, label)) = COUNTED_LEVELS.iter().find(|(l, _)| l == level) {
            self.counter.with_label_values(&[*label]).inc();
        }
    }
}

impl<S> Layer<S> for LogCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.record(event.metadata().level());
    }
}
