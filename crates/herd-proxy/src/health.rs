use regex::Regex;

use herd_common::{HealthCheck, HerdError, Result};

/// Issues the HTTP probe that gates dispatch and queue delivery.
///
/// A backend is healthy when `GET http://<endpoint><url>` succeeds at the
/// transport level and, if a pattern is configured, the response body
/// matches it. The pattern is compiled once per configuration revision.
pub struct HealthChecker {
    client: reqwest::Client,
    url: String,
    pattern: Option<Regex>,
}

impl HealthChecker {
    pub fn new(check: &HealthCheck) -> Result<HealthChecker> {
        let pattern = if check.pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(&check.pattern)
                    .map_err(|err| HerdError::Config(format!("health-check regexp: {err}")))?,
            )
        };
        Ok(HealthChecker {
            client: reqwest::Client::new(),
            url: check.url.clone(),
            pattern,
        })
    }

    pub async fn check(&self, endpoint: &str) -> bool {
        let url = format!("http://{}{}", endpoint, self.url);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(_) => return false,
        };
        match &self.pattern {
            None => true,
            Some(pattern) => match response.text().await {
                Ok(body) => pattern.is_match(&body),
                Err(_) => false,
            },
        }
    }
}
