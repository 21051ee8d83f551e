pub mod broker;

use pubchat::Broadcast;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wait up to `timeout` for a broadcast matching `pred`. Non-matching
/// broadcasts are skipped.
pub async fn recv_matching<F>(
    rx: &mut mpsc::UnboundedReceiver<Broadcast>,
    timeout: Duration,
    mut pred: F,
) -> Option<Broadcast>
where
    F: FnMut(&Broadcast) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(b)) if pred(&b) => return Some(b),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("pubchat=debug,pubchat_bot=debug,pubchat_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}
