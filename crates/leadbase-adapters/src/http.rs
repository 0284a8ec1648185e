//! Retry classification and exponential backoff for outbound HTTP calls.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Send with retry on retryable statuses and transport errors; returns the
/// raw body bytes of the first successful response.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    backoff: &BackoffPolicy,
) -> Result<Vec<u8>, FetchError> {
    let mut last_request_error: Option<reqwest::Error> = None;

    for attempt in 0..=backoff.max_retries {
        let attempt_request = match request.try_clone() {
            Some(cloned) => cloned,
            // Unclonable body: fall back to a single attempt.
            None => {
                return match request.send().await {
                    Ok(resp) => read_success_body(resp).await,
                    Err(err) => Err(FetchError::Request(err)),
                };
            }
        };

        match attempt_request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return read_success_body(resp).await;
                }
                let url = resp.url().to_string();
                if classify_status(status) == RetryDisposition::Retryable
                    && attempt < backoff.max_retries
                {
                    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    continue;
                }
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url,
                });
            }
            Err(err) => {
                if classify_reqwest_error(&err) == RetryDisposition::Retryable
                    && attempt < backoff.max_retries
                {
                    last_request_error = Some(err);
                    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    continue;
                }
                return Err(FetchError::Request(err));
            }
        }
    }

    match last_request_error {
        Some(err) => Err(FetchError::Request(err)),
        None => Err(FetchError::Decode {
            url: String::new(),
            message: "retry loop exhausted without a response".to_string(),
        }),
    }
}

async fn read_success_body(resp: reqwest::Response) -> Result<Vec<u8>, FetchError> {
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_attempt_until_the_cap() {
        let policy = BackoffPolicy {
            max_retries: 6,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        };
        let delays: Vec<u64> = (0..6)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![50, 100, 200, 400, 800, 1000]);
    }

    #[test]
    fn absurd_attempt_indexes_saturate_at_the_cap() {
        let policy = BackoffPolicy::default();
        // Shift factor overflows u32 well before this; the delay must still
        // land on max_delay instead of wrapping.
        assert_eq!(policy.delay_for_attempt(64), policy.max_delay);
        assert_eq!(policy.delay_for_attempt(usize::MAX), policy.max_delay);
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }
}
