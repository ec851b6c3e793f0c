//! Shutdown and close signals.

use tokio::sync::watch;

/// Resolves once `signal` is set or its sender is dropped.
///
/// The borrow taken by `wait_for` ends inside this function, so the future
/// may sit in a `select!` of a spawned task.
pub(crate) async fn raised(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|set| *set).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn resolves_when_set() {
        let (tx, mut rx) = watch::channel(false);
        let waiting = raised(&mut rx);
        assert_send(&waiting);
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), raised(&mut rx))
            .await
            .unwrap();
    }
}
