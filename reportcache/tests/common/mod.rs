use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reportcache::{
    config::{CollectorConfig, ReportConfig},
    errors::{FetchError, FetchResult},
    models::{Credential, RawPage, RawRow},
    upstream::UpstreamClient,
};
use tokio_util::sync::CancellationToken;

pub const CATEGORIES: [&str; 3] = ["系統開發", "會議", "測試"];

#[derive(Debug, Clone)]
pub enum Step {
    /// A page of `rows` rows, the first `dispatch` of which are dispatch tickets.
    Page { rows: usize, dispatch: usize },
    Fail(FetchError),
    /// Never answers within any sane timeout.
    Hang,
}

/// Routes collector logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn page(rows: usize) -> Step {
    Step::Page { rows, dispatch: 0 }
}

pub fn page_with_dispatch(rows: usize, dispatch: usize) -> Step {
    Step::Page { rows, dispatch }
}

/// Upstream double answering from a script, one step per call.
pub struct ScriptedUpstream {
    script: Vec<Step>,
    after_script: Step,
    latency: Duration,
    calls: AtomicUsize,
    credentials: Mutex<Vec<String>>,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

#[allow(dead_code)]
impl ScriptedUpstream {
    pub fn new(script: Vec<Step>) -> Self {
        init_logging();
        Self {
            script,
            after_script: page(0),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            credentials: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    /// Step used once the script runs out.
    pub fn then(mut self, step: Step) -> Self {
        self.after_script = step;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Cancels `token` while serving the `call`-th request (1-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn credentials_seen(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_page(
        &self,
        offset: usize,
        page_size: usize,
        credential: &Credential,
    ) -> FetchResult<RawPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.as_str().to_string());
        if let Some((on_call, token)) = &self.cancel_on_call {
            if *on_call == call + 1 {
                token.cancel();
            }
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = self.script.get(call).unwrap_or(&self.after_script).clone();
        match step {
            Step::Page { rows, dispatch } => {
                assert!(rows <= page_size, "script page larger than requested");
                Ok(RawPage {
                    total_records: None,
                    rows: (0..rows)
                        .map(|i| synthetic_row(offset + i, i < dispatch))
                        .collect(),
                })
            }
            Step::Fail(err) => Err(err),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RawPage::default())
            }
        }
    }
}

/// Row `n` of the synthetic feed: three reports per day from 2025-08-01.
pub fn synthetic_row(n: usize, dispatch: bool) -> RawRow {
    let date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap() + chrono::Duration::days((n / 3) as i64);
    let content = if dispatch {
        format!("Dispatch Order #{n}")
    } else {
        format!("<p>report {n}</p>")
    };
    RawRow(vec![
        format!("r{n}"),
        String::new(),
        format!("{} 09:00:00", date.format("%Y-%m-%d")),
        CATEGORIES[n % CATEGORIES.len()].to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        content,
    ])
}

/// Configuration with pacing removed so tests run instantly.
#[allow(dead_code)]
pub fn fast_config() -> ReportConfig {
    ReportConfig {
        collector: CollectorConfig {
            page_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            ..CollectorConfig::default()
        },
        ..ReportConfig::default()
    }
}
