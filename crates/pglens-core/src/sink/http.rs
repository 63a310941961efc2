//! Remote HTTP sink.

use std::time::Duration;

use chrono::NaiveDateTime;

use super::{Envelope, Metric, MetricSink, SinkError};
use crate::config::ConfigError;

/// POSTs metric envelopes to a remote endpoint, optionally with a
/// bearer token. Non-2xx responses and transport failures are errors;
/// the caller decides whether to retry.
pub struct HttpSink {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpSink {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Init(format!("metric HTTP client: {}", e)))?;
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }
}

impl MetricSink for HttpSink {
    fn write(
        &mut self,
        metrics: &[Metric],
        collected_at: NaiveDateTime,
    ) -> Result<(), SinkError> {
        let envelope = Envelope::new(metrics, collected_at);
        let mut request = self.client.post(&self.endpoint).json(&envelope);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(SinkError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn unreachable_endpoint_is_an_error() {
        let mut sink = HttpSink::new(
            "http://127.0.0.1:1/api/metrics".to_string(),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(matches!(sink.write(&[], ts), Err(SinkError::Http(_))));
    }
}
