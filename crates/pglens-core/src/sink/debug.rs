//! Stdout sink for local inspection.

use chrono::NaiveDateTime;

use super::{Envelope, Metric, MetricSink, SinkError};

/// Prints the metric envelope as JSON to standard output.
pub struct DebugSink {
    pretty: bool,
}

impl DebugSink {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl MetricSink for DebugSink {
    fn write(
        &mut self,
        metrics: &[Metric],
        collected_at: NaiveDateTime,
    ) -> Result<(), SinkError> {
        let envelope = Envelope::new(metrics, collected_at);
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&envelope)
        } else {
            serde_json::to_string(&envelope)
        };
        match rendered {
            Ok(text) => {
                println!("{}", text);
                Ok(())
            }
            // Metric values are plain JSON; serialization cannot fail in
            // practice, but surface it rather than swallow it.
            Err(e) => Err(SinkError::Io(std::io::Error::other(e))),
        }
    }
}
