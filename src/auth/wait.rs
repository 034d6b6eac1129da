use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Polls `condition` until it holds or `window` elapses.
///
/// Returns whether the condition was met. The condition is always checked at
/// least once, and once more at the end of the window.
pub async fn wait_until<F, Fut>(
    label: &str,
    window: Duration,
    poll_interval: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + window;

    loop {
        if condition().await {
            debug!("{label} completed");
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                "{label} not completed within {secs}s",
                secs = window.as_secs_f32()
            );
            return false;
        }

        sleep(poll_interval.min(deadline - now)).await;
    }
}
