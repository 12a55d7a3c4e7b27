use super::types::ShutdownPath;
use super::MistralOrchestrator;
use tokio::time::timeout;
use tracing::{info, warn};

impl MistralOrchestrator {
    /// Teardown sequence shared by both shutdown paths: stop the producer,
    /// stop every handler in index order, collect straggler errors for
    /// logging, join the worker tasks under a bound, then stop the HTTP
    /// server under its own deadline.
    pub(super) async fn drain(&mut self, path: ShutdownPath) {
        info!("Draining ({:?} path)", path);

        self.producer_token.cancel();

        let pool = self.pool.take();
        if let Some(pool) = &pool {
            pool.signal_shutdown();
        }

        self.collect_stragglers().await;

        // Bounded join barrier: handler and producer tasks finish
        // asynchronously, but none of them may hold up process exit.
        if let Some(pool) = pool {
            if !pool.join(self.timings.join_timeout).await {
                warn!(
                    "Handler pool did not drain within {:?}",
                    self.timings.join_timeout
                );
            }
        }

        if let Some(join) = self.producer_join.take() {
            if timeout(self.timings.join_timeout, join).await.is_err() {
                warn!(
                    "Metric socket producer did not exit within {:?}",
                    self.timings.join_timeout
                );
            }
        }

        self.stop_http_server().await;

        info!("Mistral shutdown complete");
    }

    /// Errors arriving after commit come from components mid-shutdown.
    /// They are logged and never re-escalate; the loop ends once the
    /// channels stay quiet for a full drain window.
    async fn collect_stragglers(&mut self) {
        loop {
            let next = timeout(self.timings.drain_window, async {
                tokio::select! {
                    report = self.fault_rx.recv() => report
                        .map(|r| format!("{}: {}", r.component, r.error)),
                    e = self.producer_err_rx.recv() => e.map(|e| e.to_string()),
                }
            })
            .await;

            match next {
                Ok(Some(details)) => warn!("Error during drain: {}", details),
                Ok(None) => break,
                Err(_) => break,
            }
        }
    }

    /// Let open connections finish, but never past the deadline.
    async fn stop_http_server(&mut self) {
        self.server_token.cancel();

        let Some(join) = self.server_join.take() else {
            return;
        };

        let abort = join.abort_handle();
        match timeout(self.timings.http_shutdown_timeout, join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("HTTP server task ended abnormally: {}", e),
            Err(_) => {
                abort.abort();
                warn!(
                    "HTTP shutdown exceeded {:?}, aborting remaining connections",
                    self.timings.http_shutdown_timeout
                );
            }
        }
    }
}
