//! Run orchestration: origin up, target ready, clients sent, verdict out
//!
//! A run stops at the first failure. Client failures are reported with the
//! request that was sent and the response that came back; failures seen by
//! the origin are reported after every client has passed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use htc_core::evaluator::check_all;
use htc_core::verifier::verify;
use htc_core::Program;
use log::{debug, info, warn};
use reqwest::StatusCode;
use thiserror::Error;

use crate::client::{self, describe_response};
use crate::origin::{Origin, INTERNAL_CHECK_PATH};
use crate::proxy::Proxy;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Script(#[from] htc_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Setup(String),

    /// An assertion did not hold; the payload is the full report
    #[error("{0}")]
    Failed(String),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Failed(_) => 1,
            _ => 2,
        }
    }
}

/// Where client requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Straight to the mock origin, for checking a script on its own
    Origin,
    /// A proxy someone else runs
    Address(String),
    /// A proxy started with `sh -c`
    Command(String),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub script: PathBuf,
    pub target: Target,
    pub origin_port: u16,
    pub ready_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub handlers: usize,
    pub clients: usize,
    pub assertions: usize,
}

pub async fn run(config: &RunConfig) -> Result<Summary, RunError> {
    let source = std::fs::read_to_string(&config.script)?;
    let program = htc_core::parse(&source)?;
    for diagnostic in verify(&program).into_result()? {
        warn!("{}", diagnostic);
    }
    debug!(
        "{}: {} handler(s), {} client(s)",
        config.script.display(),
        program.handlers.len(),
        program.clients.len()
    );

    let http = reqwest::Client::new();
    let origin = Origin::start(program.handlers.clone(), config.origin_port)?;
    info!("origin listening on {}", origin.addr());

    let result = drive(config, &http, &origin, &program).await;
    origin.stop().await;
    result
}

async fn drive(
    config: &RunConfig,
    http: &reqwest::Client,
    origin: &Origin,
    program: &Program,
) -> Result<Summary, RunError> {
    wait_for_get(http, &origin.check_url(), config.ready_timeout).await?;

    match &config.target {
        Target::Origin => exchange(http, &origin.addr().to_string(), program, origin).await,
        Target::Address(addr) => {
            wait_for_get(http, &check_url(addr), config.ready_timeout).await?;
            exchange(http, addr, program, origin).await
        }
        Target::Command(command) => {
            let mut proxy = Proxy::spawn(command, origin.addr().port())?;
            let addr = proxy.addr();
            info!(
                "proxy started on {} (run dir {})",
                addr,
                proxy.run_dir().display()
            );

            let result = match wait_for_get(http, &check_url(&addr), config.ready_timeout).await {
                Ok(()) => exchange(http, &addr, program, origin).await,
                Err(e) => Err(e),
            };
            proxy.stop().await;
            proxy.finish(result.is_ok());
            result
        }
    }
}

/// Send every client in order, then collect what the origin saw
async fn exchange(
    http: &reqwest::Client,
    target: &str,
    program: &Program,
    origin: &Origin,
) -> Result<Summary, RunError> {
    let mut summary = Summary {
        handlers: program.handlers.len(),
        ..Summary::default()
    };

    for stanza in &program.clients {
        let request = stanza.request_or_default();
        info!("client '{}': {} {}", stanza.name, request.method, request.uri);

        let resp = client::send(http, target, &request).await?;
        let failures = check_all(&stanza.expectations, &resp)?;
        if let Some(first) = failures.first() {
            return Err(RunError::Failed(format!(
                "client '{}'\n{}{}{}",
                stanza.name,
                request,
                describe_response(&resp),
                first
            )));
        }
        summary.clients += 1;
        summary.assertions += stanza.expectations.len();
    }

    let origin_failures = origin.failures();
    if let Some(first) = origin_failures.first() {
        return Err(RunError::Failed(format!(
            "origin ({} failure(s))\n{}",
            origin_failures.len(),
            first
        )));
    }
    Ok(summary)
}

fn check_url(addr: &str) -> String {
    format!("http://{}{}", addr, INTERNAL_CHECK_PATH)
}

/// Poll `url` until it answers 200. Any other status is fatal; connection
/// errors are retried until `timeout` runs out.
pub async fn wait_for_get(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), RunError> {
    let deadline = Instant::now() + timeout;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        match http.get(url).timeout(POLL_REQUEST_TIMEOUT).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                debug!("{} is up", url);
                return Ok(());
            }
            Ok(resp) => {
                return Err(RunError::Setup(format!(
                    "Unexpected status code received from url {}: {}",
                    url,
                    resp.status().as_u16()
                )))
            }
            Err(e) => debug!("waiting for {}: {}", url, e),
        }

        if Instant::now() >= deadline {
            return Err(RunError::Setup(format!(
                "{} not ready after {}s",
                url,
                timeout.as_secs_f64()
            )));
        }
    }
}
