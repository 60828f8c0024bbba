//! Matcher backends selectable at runtime.

use std::{process::Stdio, time::Duration};

use pricescout_core::{
  Error as CoreError,
  listing::{Listing, ProductGroup},
  matcher::{HeuristicMatcher, Matcher},
};
use tokio::{io::AsyncWriteExt as _, process::Command};
use tracing::{debug, warn};

pub const DEFAULT_MATCHER_TIMEOUT: Duration = Duration::from_secs(20);

// ─── Out-of-process matcher ──────────────────────────────────────────────────

/// Delegates grouping to an external program.
///
/// The program receives the whole batch as a JSON array of listings on stdin
/// and must print a JSON array of `{"baseProduct": …, "products": […]}` on
/// stdout. It is killed if it outlives `timeout`.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
  pub command: String,
  pub args:    Vec<String>,
  pub timeout: Duration,
}

impl ProcessMatcher {
  pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
    Self { command: command.into(), args, timeout: DEFAULT_MATCHER_TIMEOUT }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Spawn, feed and drain the program, all within `timeout`.
  async fn run(&self, input: Vec<u8>) -> Result<Vec<u8>, CoreError> {
    tokio::time::timeout(self.timeout, self.exchange(input))
      .await
      .map_err(|_| CoreError::Matcher(format!("timed out after {:?}", self.timeout)))?
  }

  async fn exchange(&self, input: Vec<u8>) -> Result<Vec<u8>, CoreError> {
    let mut child = Command::new(&self.command)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| CoreError::Matcher(format!("failed to start {}: {e}", self.command)))?;

    // Feed stdin while draining stdout; dropping stdin sends EOF.
    let stdin = child.stdin.take();
    let feed = async move {
      match stdin {
        Some(mut stdin) => stdin.write_all(&input).await,
        None => Ok(()),
      }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(|e| CoreError::Matcher(e.to_string()))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(CoreError::Matcher(format!(
        "exited with {}: {}",
        output.status,
        stderr.trim()
      )));
    }
    // A program may answer without consuming the whole batch.
    if let Err(e) = fed
      && e.kind() != std::io::ErrorKind::BrokenPipe
    {
      return Err(CoreError::Matcher(format!("failed to write batch: {e}")));
    }
    Ok(output.stdout)
  }
}

impl Matcher for ProcessMatcher {
  async fn group(&self, listings: &[Listing]) -> Result<Vec<ProductGroup>, CoreError> {
    if listings.is_empty() {
      return Ok(Vec::new());
    }

    let input = serde_json::to_vec(listings)?;
    let stdout = self.run(input).await?;
    let groups: Vec<ProductGroup> = serde_json::from_slice(&stdout)
      .map_err(|e| CoreError::Matcher(format!("unreadable output: {e}")))?;

    let before = groups.len();
    let groups: Vec<ProductGroup> = groups.into_iter().filter(|g| !g.members.is_empty()).collect();
    if groups.len() != before {
      warn!(dropped = before - groups.len(), "matcher returned empty groups");
    }
    debug!(groups = groups.len(), listings = listings.len(), "external matcher finished");
    Ok(groups)
  }
}

// ─── Runtime selection ───────────────────────────────────────────────────────

/// The matcher a server is configured with.
#[derive(Debug, Clone)]
pub enum MatcherBackend {
  Heuristic(HeuristicMatcher),
  Process(ProcessMatcher),
}

impl Default for MatcherBackend {
  fn default() -> Self { Self::Heuristic(HeuristicMatcher::default()) }
}

impl Matcher for MatcherBackend {
  async fn group(&self, listings: &[Listing]) -> Result<Vec<ProductGroup>, CoreError> {
    match self {
      Self::Heuristic(m) => m.group(listings).await,
      Self::Process(m) => m.group(listings).await,
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  fn listing(name: &str) -> Listing {
    Listing {
      name:             name.into(),
      price:            10.0,
      currency:         "KES".into(),
      price_normalized: 10.0,
      store:            "jumia".into(),
      image_url:        None,
      url:              None,
      rating:           None,
    }
  }

  fn shell(script: &str) -> ProcessMatcher {
    ProcessMatcher::new("sh", vec!["-c".into(), script.into()]).with_timeout(Duration::from_secs(5))
  }

  #[tokio::test]
  async fn parses_groups_from_stdout() {
    let matcher = shell(
      r#"cat > /dev/null; echo '[{"baseProduct":{"name":"iPhone 13","price":10,"currency":"KES","priceNormalized":10,"store":"jumia"},"products":[{"name":"iPhone 13","price":10,"currency":"KES","priceNormalized":10,"store":"jumia"}]}]'"#,
    );

    let groups = matcher.group(&[listing("iPhone 13")]).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].base.name, "iPhone 13");
  }

  #[tokio::test]
  async fn failures_surface_as_matcher_errors() {
    for script in ["cat > /dev/null; echo not-json", "exit 3"] {
      let err = shell(script).group(&[listing("x")]).await.unwrap_err();
      assert!(matches!(err, CoreError::Matcher(_)), "{script}: {err}");
    }
  }

  #[tokio::test]
  async fn slow_matcher_times_out() {
    let matcher = shell("sleep 5").with_timeout(Duration::from_millis(100));
    let err = matcher.group(&[listing("x")]).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
  }

  fn large_batch() -> Vec<Listing> {
    (0..3_000).map(|i| listing(&format!("Samsung Galaxy A14 128GB variant {i}"))).collect()
  }

  #[tokio::test]
  async fn timeout_covers_a_program_that_never_reads() {
    let matcher = shell("sleep 30").with_timeout(Duration::from_millis(200));

    let result = tokio::time::timeout(Duration::from_secs(5), matcher.group(&large_batch())).await;

    let err = result.expect("matcher call outlived its own timeout").unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
  }

  #[tokio::test]
  async fn program_may_answer_before_reading_the_batch() {
    let matcher = shell("echo '[]'; cat > /dev/null");

    let groups = matcher.group(&large_batch()).await.unwrap();

    assert!(groups.is_empty());
  }

  #[tokio::test]
  async fn heuristic_backend_is_default() {
    let groups = MatcherBackend::default()
      .group(&[listing("iPhone 13"), listing("iphone 13")])
      .await
      .unwrap();
    assert_eq!(groups.len(), 1);
  }
}
