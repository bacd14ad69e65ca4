//! Scripted fakes for transport tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::http::{HttpSend, WireRequest, WireResponse};
use super::limiter::RateLimiter;
use super::retry::Sleeper;
use super::transport::{Client, ClientConfig};

pub type Scripted = Result<WireResponse, String>;

/// Replays a fixed list of responses and records every request
#[derive(Clone, Default)]
pub struct ScriptedHttp {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<WireRequest>>>,
}

impl ScriptedHttp {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::default(),
        }
    }

    pub fn json(status: u16, body: &str) -> Scripted {
        Ok(WireResponse {
            status,
            status_line: status.to_string(),
            retry_after: None,
            body: body.as_bytes().to_vec(),
        })
    }

    pub fn json_with_retry_after(status: u16, body: &str, retry_after: &str) -> Scripted {
        let mut response = Self::json(status, body)?;
        response.retry_after = Some(retry_after.to_string());
        Ok(response)
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Request bodies decoded as JSON
    pub fn request_bodies(&self) -> Vec<serde_json::Value> {
        self.requests()
            .iter()
            .filter_map(|r| r.body.as_deref())
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }
}

#[async_trait]
impl HttpSend for ScriptedHttp {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, String> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

/// Records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
    cancel_on_sleep: Option<CancellationToken>,
}

impl RecordingSleeper {
    /// A sleeper that fires `cancel` when asked to sleep
    pub fn cancelling(cancel: CancellationToken) -> Self {
        Self {
            calls: Mutex::default(),
            cancel_on_sleep: Some(cancel),
        }
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
        if let Some(cancel) = &self.cancel_on_sleep {
            cancel.cancel();
        }
    }
}

/// Client with no rate limit, recorded sleeps and jitter pinned to 1.0
pub fn test_client(http: ScriptedHttp) -> (Client, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut config = ClientConfig::new("test-token");
    config.base_url = Some("http://notion.test/v1".to_string());

    let client = Client::with_http(config, Arc::new(http))
        .unwrap()
        .with_limiter(Arc::new(RateLimiter::unlimited()))
        .with_sleeper(sleeper.clone())
        .with_jitter(|| 1.0);
    (client, sleeper)
}
