use crate::app::FaultReport;
use crate::error::{MistralError, Result};
use crate::message::MetricMessage;
use crate::metrics::format_line;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One metric processing unit.
///
/// Owns its bounded input queue and its private shutdown token. A fatal
/// per-message error is reported once on the shared fault channel; the
/// consume loop keeps running so queued good messages are still serviced.
pub struct MetricHandler {
    num: usize,
    input: mpsc::Receiver<MetricMessage>,
    shutdown: CancellationToken,
    fault: mpsc::Sender<FaultReport>,
    outbound: Option<mpsc::Sender<String>>,
    failed: bool,
}

impl MetricHandler {
    pub async fn run(mut self) {
        debug!("Handler #{} consuming", self.num);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // Close the queue so pending sends fail fast, then
                    // drain whatever is already buffered before exiting.
                    self.input.close();
                    while let Some(message) = self.input.recv().await {
                        self.process(message).await;
                    }
                    break;
                }
                message = self.input.recv() => match message {
                    Some(message) => self.process(message).await,
                    None => break,
                },
            }
        }

        debug!("Handler #{} stopped", self.num);
    }

    async fn process(&mut self, message: MetricMessage) {
        if let Err(e) = self.forward(message).await {
            self.fail(e).await;
        }
    }

    async fn forward(&self, message: MetricMessage) -> Result<()> {
        if !message.value.is_finite() {
            return Err(MistralError::handler(
                self.num,
                format!("non-finite value for metric '{}'", message.path),
            ));
        }

        let line = format_line(&message);

        match &self.outbound {
            Some(outbound) => outbound.send(line).await.map_err(|_| {
                MistralError::handler(self.num, "metric socket queue closed")
            }),
            None => {
                debug!("Handler #{} formatted: {}", self.num, line);
                Ok(())
            }
        }
    }

    async fn fail(&mut self, e: MistralError) {
        error!("Handler #{} processing error: {}", self.num, e);

        // Surface the fault exactly once; the unit keeps consuming so one
        // bad message cannot strand the good ones behind it.
        if self.failed {
            return;
        }
        self.failed = true;

        let report = FaultReport::new(format!("handler #{}", self.num), e);
        if self.fault.send(report).await.is_err() {
            warn!("Handler #{} fault channel closed", self.num);
        }
    }
}

/// Round-robin message distribution over the live handler queues.
///
/// Enqueueing blocks when the target queue is full (backpressure) and
/// fails once the target handler has closed its queue during shutdown.
#[derive(Clone)]
pub struct Dispatcher {
    senders: Arc<Vec<mpsc::Sender<MetricMessage>>>,
    next: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub(crate) fn new(senders: Vec<mpsc::Sender<MetricMessage>>) -> Self {
        Self {
            senders: Arc::new(senders),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn dispatch(&self, message: MetricMessage) -> Result<()> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders[index]
            .send(message)
            .await
            .map_err(|_| MistralError::handler(index, "input queue closed"))
    }

    pub fn handler_count(&self) -> usize {
        self.senders.len()
    }
}

/// The fixed set of handlers launched at startup.
///
/// The pool keeps each handler's shutdown token and join handle; the
/// orchestrator cancels the tokens in index order and then waits on the
/// pool as a timed join barrier.
pub struct HandlerPool {
    tokens: Vec<CancellationToken>,
    joins: Vec<JoinHandle<()>>,
    dispatcher: Dispatcher,
}

impl HandlerPool {
    pub fn spawn(
        count: usize,
        queue_capacity: usize,
        fault: mpsc::Sender<FaultReport>,
        outbound: Option<mpsc::Sender<String>>,
    ) -> Self {
        let mut senders = Vec::with_capacity(count);
        let mut tokens = Vec::with_capacity(count);
        let mut joins = Vec::with_capacity(count);

        for num in 0..count {
            let (tx, rx) = mpsc::channel(queue_capacity);
            let token = CancellationToken::new();

            let handler = MetricHandler {
                num,
                input: rx,
                shutdown: token.clone(),
                fault: fault.clone(),
                outbound: outbound.clone(),
                failed: false,
            };

            joins.push(tokio::spawn(handler.run()));
            senders.push(tx);
            tokens.push(token);
            info!("Launched mistral handler #{}", num);
        }

        Self {
            tokens,
            joins,
            dispatcher: Dispatcher::new(senders),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Cancel every handler's private shutdown token, in index order.
    pub fn signal_shutdown(&self) {
        for token in &self.tokens {
            token.cancel();
        }
    }

    /// Timed join barrier over the handler tasks. Returns false when the
    /// deadline expired with tasks still running; those tasks are left
    /// detached rather than blocking process exit.
    pub async fn join(self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        let mut clean = true;

        for (num, join) in self.joins.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Handler #{} task ended abnormally: {}", num, e);
                    clean = false;
                }
                Err(_) => {
                    warn!("Handler #{} did not exit before the join deadline", num);
                    clean = false;
                }
            }
        }

        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::time::timeout;
    use uuid::Uuid;

    fn message(path: &str, value: f64) -> MetricMessage {
        MetricMessage {
            id: Uuid::new_v4(),
            path: path.to_string(),
            value,
            timestamp: Utc::now(),
        }
    }

    fn spawn_handler(
        queue_capacity: usize,
        outbound: Option<mpsc::Sender<String>>,
    ) -> (
        mpsc::Sender<MetricMessage>,
        CancellationToken,
        mpsc::Receiver<FaultReport>,
        JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let (fault_tx, fault_rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let handler = MetricHandler {
            num: 0,
            input: rx,
            shutdown: token.clone(),
            fault: fault_tx,
            outbound,
            failed: false,
        };

        (tx, token, fault_rx, tokio::spawn(handler.run()))
    }

    #[tokio::test]
    async fn full_queue_blocks_instead_of_dropping() {
        // Queue capacity 1 and no consumer running yet: the first send is
        // buffered, the second must block until a slot frees up.
        let (tx, mut rx) = mpsc::channel::<MetricMessage>(1);

        tx.send(message("a", 1.0)).await.unwrap();

        let blocked = timeout(Duration::from_millis(50), tx.send(message("b", 2.0))).await;
        assert!(blocked.is_err(), "second send should block, not drop");

        // Draining one message unblocks the next sender.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.path, "a");
        timeout(Duration::from_millis(50), tx.send(message("b", 2.0)))
            .await
            .expect("send should succeed once a slot is free")
            .unwrap();
    }

    #[tokio::test]
    async fn backpressure_propagates_through_a_stalled_handler() {
        // Outbound capacity 1 with nobody reading: the handler stalls on a
        // forward, its capacity-1 input queue fills behind it, and further
        // enqueues block until the outbound side drains.
        let (line_tx, mut line_rx) = mpsc::channel(1);
        let (tx, _token, _fault_rx, _join) = spawn_handler(1, Some(line_tx));

        tx.send(message("m.0", 0.0)).await.unwrap();
        tx.send(message("m.1", 1.0)).await.unwrap();
        tx.send(message("m.2", 2.0)).await.unwrap();

        let blocked = timeout(Duration::from_millis(100), tx.send(message("m.3", 3.0))).await;
        assert!(blocked.is_err(), "enqueue must block, not drop or error");

        // Draining one forwarded line lets the pipeline advance again.
        let first = line_rx.recv().await.unwrap();
        assert!(first.starts_with("m.0"));
        timeout(Duration::from_millis(500), tx.send(message("m.3", 3.0)))
            .await
            .expect("enqueue should succeed once the handler advances")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_messages_then_exits() {
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (tx, token, _fault_rx, join) = spawn_handler(4, Some(line_tx));

        for i in 0..3 {
            tx.send(message(&format!("m.{}", i), i as f64)).await.unwrap();
        }

        token.cancel();
        timeout(Duration::from_secs(1), join)
            .await
            .expect("handler exits after shutdown")
            .unwrap();

        let mut drained = 0;
        while line_rx.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, 3, "buffered messages are processed before exit");

        // The closed queue rejects further sends immediately.
        assert!(tx.send(message("late", 1.0)).await.is_err());
    }

    #[tokio::test]
    async fn processing_error_reported_once_and_loop_continues() {
        let (line_tx, mut line_rx) = mpsc::channel(8);
        let (tx, token, mut fault_rx, join) = spawn_handler(8, Some(line_tx));

        tx.send(message("bad", f64::NAN)).await.unwrap();
        tx.send(message("good.one", 1.0)).await.unwrap();
        tx.send(message("bad.again", f64::INFINITY)).await.unwrap();
        tx.send(message("good.two", 2.0)).await.unwrap();

        // Exactly one fault report despite two bad messages.
        let report = timeout(Duration::from_secs(1), fault_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(report.component.contains("handler #0"));
        assert!(
            timeout(Duration::from_millis(50), fault_rx.recv())
                .await
                .is_err(),
            "second fault must not be reported"
        );

        // Good messages around the bad ones were still forwarded.
        token.cancel();
        join.await.unwrap();
        let mut lines = Vec::new();
        while let Ok(line) = line_rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("good.one"));
        assert!(lines[1].starts_with("good.two"));
    }

    #[tokio::test]
    async fn dispatcher_round_robins_across_handlers() {
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let dispatcher = Dispatcher::new(vec![tx_a, tx_b]);

        for i in 0..4 {
            dispatcher.dispatch(message(&format!("m.{}", i), 0.0)).await.unwrap();
        }

        let mut count_a = 0;
        while rx_a.try_recv().is_ok() {
            count_a += 1;
        }
        let mut count_b = 0;
        while rx_b.try_recv().is_ok() {
            count_b += 1;
        }

        assert_eq!(count_a, 2);
        assert_eq!(count_b, 2);
    }

    #[tokio::test]
    async fn pool_signals_shutdown_and_joins() {
        let (fault_tx, _fault_rx) = mpsc::channel(4);
        let pool = HandlerPool::spawn(2, 4, fault_tx, None);
        let dispatcher = pool.dispatcher();

        assert_eq!(pool.len(), 2);
        dispatcher.dispatch(message("m", 1.0)).await.unwrap();

        pool.signal_shutdown();
        assert!(pool.join(Duration::from_secs(1)).await);

        // Handlers are gone; dispatch now fails fast.
        assert!(dispatcher.dispatch(message("late", 1.0)).await.is_err());
    }
}
