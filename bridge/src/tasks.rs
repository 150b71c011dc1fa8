//! Long-running background loops with shutdown and error containment.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Runs `body` every `period` until the shutdown flag flips. A failed
/// iteration is logged and the loop carries on with the next tick, so a
/// flaky server can never kill the loop.
pub fn spawn_supervised<F, Fut, E>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    body: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Display,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // skip the first tick since it fires immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = body().await {
                        error!("{} task iteration failed: {}", name, err);
                    }
                }
                changed = shutdown.changed() => {
                    // a dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        info!("{} task stopped", name);
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_body_runs_every_period() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let handle = spawn_supervised("test", Duration::from_millis(10), rx, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        });

        sleep(Duration::from_millis(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_iterations_do_not_kill_the_loop() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let handle = spawn_supervised("test", Duration::from_millis(10), rx, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("boom".to_string())
            }
        });

        sleep(Duration::from_millis(25)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_before_first_tick() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let handle = spawn_supervised("test", Duration::from_secs(60), rx, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        });

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_supervised("test", Duration::from_secs(60), rx, || async {
            Ok::<(), String>(())
        });
        drop(tx);
        handle.await.unwrap();
    }
}
