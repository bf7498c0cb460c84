//! Task supervisor.
//!
//! Every command invocation that clears the gate is launched as an
//! independent tokio task and tracked with a [`TaskMeta`] record.  A single
//! worker owns the `JoinSet`, harvests completions as they arrive, and routes
//! each result (or failure) through the injected [`ReplyRouter`].  The worker
//! runs concurrently with the receive loops; launching a task is a cheap
//! channel send, so a slow handler never backpressures message intake.
//!
//! Handler failures are contained here.  An error return or a panic is
//! logged and forwarded to the router; the process keeps running and
//! unrelated in-flight tasks are untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::CommandReply;
use crate::error::BoxError;
use crate::message::AnyMessage;

/// One in-flight command invocation.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    /// The message that triggered the command.
    pub message: AnyMessage,
    /// Name of the command being run.
    pub command: String,
}

/// Where harvested results go.
///
/// Implemented by the bot core; kept as a trait so the supervisor can be
/// exercised in isolation.
#[async_trait]
pub trait ReplyRouter: Send + Sync {
    /// Delivers a successful handler result.
    async fn deliver(&self, meta: &TaskMeta, reply: CommandReply);

    /// Handles a failed (errored or panicked) handler.
    async fn handler_error(&self, meta: &TaskMeta, error: BoxError);
}

struct SpawnRequest {
    meta: TaskMeta,
    future: BoxFuture<'static, Result<CommandReply, BoxError>>,
}

/// Launches command tasks and harvests their results.
pub struct Supervisor {
    tx: mpsc::UnboundedSender<SpawnRequest>,
    in_flight: Arc<AtomicUsize>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Supervisor {
    /// Starts the harvest worker.
    ///
    /// `grace` bounds how long in-flight tasks may keep running after
    /// `shutdown` fires before they are aborted.
    pub fn start(router: Arc<dyn ReplyRouter>, shutdown: CancellationToken, grace: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(harvest_loop(
            rx,
            router,
            shutdown,
            grace,
            Arc::clone(&in_flight),
        ));
        Self {
            tx,
            in_flight,
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Launches one gated invocation.
    pub fn submit(
        &self,
        meta: TaskMeta,
        future: BoxFuture<'static, Result<CommandReply, BoxError>>,
    ) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(SpawnRequest { meta, future }).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!("Supervisor worker is gone; dropping command task");
        }
    }

    /// Number of submitted tasks not yet harvested.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits for the harvest worker to finish.  Call after triggering the
    /// shutdown token.
    pub async fn wait(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle
            && handle.await.is_err()
        {
            error!("Supervisor worker panicked");
        }
    }
}

async fn harvest_loop(
    mut rx: mpsc::UnboundedReceiver<SpawnRequest>,
    router: Arc<dyn ReplyRouter>,
    shutdown: CancellationToken,
    grace: Duration,
    in_flight: Arc<AtomicUsize>,
) {
    let mut tasks: JoinSet<Result<CommandReply, BoxError>> = JoinSet::new();
    let mut meta: HashMap<Id, TaskMeta> = HashMap::new();

    loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(request) => {
                    debug!(command = %request.meta.command, "Launching command task");
                    let id = tasks.spawn(request.future).id();
                    meta.insert(id, request.meta);
                }
                // All handles dropped; finish what is left and stop.
                None => break,
            },
            Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                harvest(joined, &mut meta, router.as_ref(), &in_flight).await;
            }
            () = shutdown.cancelled() => {
                drain(&mut tasks, &mut meta, router.as_ref(), &in_flight, grace).await;
                return;
            }
        }
    }

    drain(&mut tasks, &mut meta, router.as_ref(), &in_flight, grace).await;
}

async fn harvest(
    joined: Result<(Id, Result<CommandReply, BoxError>), tokio::task::JoinError>,
    meta: &mut HashMap<Id, TaskMeta>,
    router: &dyn ReplyRouter,
    in_flight: &AtomicUsize,
) {
    match joined {
        Ok((id, result)) => {
            let Some(task) = meta.remove(&id) else {
                return;
            };
            match result {
                Ok(reply) => router.deliver(&task, reply).await,
                Err(error) => {
                    error!(
                        command = %task.command,
                        error = %error,
                        "Command handler failed"
                    );
                    router.handler_error(&task, error).await;
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Err(join_error) => {
            let Some(task) = meta.remove(&join_error.id()) else {
                return;
            };
            if join_error.is_panic() {
                error!(command = %task.command, "Command handler panicked");
                router
                    .handler_error(&task, Box::new(join_error))
                    .await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

async fn drain(
    tasks: &mut JoinSet<Result<CommandReply, BoxError>>,
    meta: &mut HashMap<Id, TaskMeta>,
    router: &dyn ReplyRouter,
    in_flight: &AtomicUsize,
    grace: Duration,
) {
    if tasks.is_empty() {
        return;
    }
    info!(remaining = tasks.len(), "Waiting for in-flight command tasks");
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
            Ok(Some(joined)) => harvest(joined, meta, router, in_flight).await,
            Ok(None) => return,
            Err(_elapsed) => {
                warn!(aborted = tasks.len(), "Grace period elapsed; aborting remaining tasks");
                tasks.abort_all();
                while let Some(joined) = tasks.join_next_with_id().await {
                    harvest(joined, meta, router, in_flight).await;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Platform, StandardizedMessage};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<(String, String)>>,
        failed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ReplyRouter for Recorder {
        async fn deliver(&self, meta: &TaskMeta, reply: CommandReply) {
            let text = match reply {
                CommandReply::Text(t) => t,
                other => format!("{other:?}"),
            };
            self.delivered.lock().push((meta.command.clone(), text));
        }

        async fn handler_error(&self, meta: &TaskMeta, error: BoxError) {
            self.failed.lock().push((meta.command.clone(), error.to_string()));
        }
    }

    fn meta(command: &str) -> TaskMeta {
        TaskMeta {
            message: StandardizedMessage::new("!x", "alice", "lobby", Platform::Twitch).into(),
            command: command.to_string(),
        }
    }

    async fn settle(supervisor: &Supervisor) {
        while supervisor.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_routed() {
        let recorder = Arc::new(Recorder::default());
        let supervisor = Supervisor::start(
            Arc::clone(&recorder) as Arc<dyn ReplyRouter>,
            CancellationToken::new(),
            Duration::from_secs(5),
        );

        supervisor.submit(
            meta("ping"),
            Box::pin(async { Ok(CommandReply::Text("pong!".to_string())) }),
        );
        settle(&supervisor).await;

        assert_eq!(
            recorder.delivered.lock().as_slice(),
            &[("ping".to_string(), "pong!".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_handler_does_not_affect_others() {
        let recorder = Arc::new(Recorder::default());
        let supervisor = Supervisor::start(
            Arc::clone(&recorder) as Arc<dyn ReplyRouter>,
            CancellationToken::new(),
            Duration::from_secs(5),
        );

        supervisor.submit(
            meta("broken"),
            Box::pin(async { Err::<CommandReply, BoxError>("boom".into()) }),
        );
        supervisor.submit(
            meta("slow"),
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(CommandReply::Text("done".to_string()))
            }),
        );
        settle(&supervisor).await;

        assert_eq!(
            recorder.failed.lock().as_slice(),
            &[("broken".to_string(), "boom".to_string())]
        );
        assert_eq!(
            recorder.delivered.lock().as_slice(),
            &[("slow".to_string(), "done".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_panicking_handler_is_contained() {
        let recorder = Arc::new(Recorder::default());
        let supervisor = Supervisor::start(
            Arc::clone(&recorder) as Arc<dyn ReplyRouter>,
            CancellationToken::new(),
            Duration::from_secs(5),
        );

        supervisor.submit(meta("panicky"), Box::pin(async { panic!("oh no") }));
        supervisor.submit(
            meta("fine"),
            Box::pin(async { Ok(CommandReply::Text("still here".to_string())) }),
        );
        settle(&supervisor).await;

        assert_eq!(recorder.failed.lock().len(), 1);
        assert_eq!(
            recorder.delivered.lock().as_slice(),
            &[("fine".to_string(), "still here".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_after_grace() {
        let recorder = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        let supervisor = Supervisor::start(
            Arc::clone(&recorder) as Arc<dyn ReplyRouter>,
            shutdown.clone(),
            Duration::from_secs(2),
        );

        supervisor.submit(
            meta("stuck"),
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CommandReply::None)
            }),
        );
        // Let the worker pick the task up before signaling shutdown.
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();
        supervisor.wait().await;

        assert!(recorder.delivered.lock().is_empty());
    }
}
