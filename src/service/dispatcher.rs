//! Per-connection dispatch: verify → upgrade → assign → handle → release.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::contracts::{
    Connection, ConnectionProcessor, ErrorReporter, HandshakeRequest, RequestVerifier,
    TracingReporter, Transport, Upgrader,
};
use super::lifecycle::{DispatchReport, DispatchState};
use crate::domain::PoolDirectory;
use crate::error::DispatchError;

/// Drives one connection through its lifecycle.
///
/// Shared by every dispatch (wrap it in an [`Arc`]); each dispatch runs on
/// its own task. Every connection that reaches `Assigned` is released from
/// the directory exactly once, whatever the processor returns.
pub struct Dispatcher<E, P> {
    directory: Arc<PoolDirectory<E>>,
    processor: P,
    verifier: Option<Arc<dyn RequestVerifier>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<E, P> Dispatcher<E, P>
where
    E: Send + Sync + 'static,
{
    /// Creates a dispatcher without a verifier, reporting through
    /// [`TracingReporter`].
    #[must_use]
    pub fn new(directory: Arc<PoolDirectory<E>>, processor: P) -> Self {
        Self {
            directory,
            processor,
            verifier: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Requires every request to pass `verifier` before it is upgraded.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl RequestVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Routes errors to `reporter` instead of the log.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// The pool directory connections are assigned to.
    #[must_use]
    pub fn directory(&self) -> &Arc<PoolDirectory<E>> {
        &self.directory
    }

    /// The connection processor.
    #[must_use]
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// `PENDING → VERIFIED`. Runs before any upgrade is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::VerificationFailed`] (already reported) if
    /// the verifier rejects the request.
    pub fn verify(&self, request: &HandshakeRequest) -> Result<(), DispatchError> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };
        verifier.verify(request).map_err(|source| {
            let error = DispatchError::VerificationFailed(source);
            self.reporter
                .report_error(&DispatchReport::new().context(), &error);
            error
        })
    }

    /// Runs the full lifecycle for one request.
    pub async fn dispatch<U>(&self, request: &HandshakeRequest, upgrader: U) -> DispatchReport
    where
        U: Upgrader,
        P: ConnectionProcessor<U::Stream, E>,
    {
        if let Err(error) = self.verify(request) {
            let mut report = DispatchReport::new();
            report.errors.push(error);
            report.enter(DispatchState::Errored);
            return report;
        }
        self.run(upgrader).await
    }

    /// Runs the lifecycle of an already verified request, from the upgrade
    /// to the release.
    pub async fn run<U>(&self, upgrader: U) -> DispatchReport
    where
        U: Upgrader,
        P: ConnectionProcessor<U::Stream, E>,
    {
        let mut report = DispatchReport::new();
        report.enter(DispatchState::Verified);

        let stream = match upgrader.upgrade().await {
            Ok(stream) => stream,
            Err(source) => {
                self.fail(&mut report, DispatchError::UpgradeFailed(source));
                return report;
            }
        };
        let mut conn = Connection::new(stream);
        let conn_id = conn.id();
        report.conn_id = Some(conn_id);
        report.enter(DispatchState::Upgraded);

        let assignment = match self.directory.assign(conn_id).await {
            Ok(assignment) => assignment,
            Err(error) => {
                conn.into_stream().close(&error).await;
                self.fail(&mut report, error);
                return report;
            }
        };
        let pool_id = assignment.pool_id;
        report.pool_id = Some(pool_id);
        report.enter(DispatchState::Assigned);
        tracing::debug!(%conn_id, %pool_id, "connection handling started");

        let environment = assignment.environment;
        // A panicking processor must not skip the release below.
        let outcome = AssertUnwindSafe(self.processor.handle(&mut conn, &*environment))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()));
        if let Err(source) = outcome {
            let error = DispatchError::ProcessingFailed(source);
            self.reporter.report_error(&report.context(), &error);
            report.errors.push(error);
        }
        drop(environment);
        report.enter(DispatchState::Handled);

        match self.directory.release(conn_id).await {
            Ok(release) => {
                report.enter(DispatchState::Released);
                tracing::debug!(
                    %conn_id,
                    %pool_id,
                    pool_removed = release.pool_removed,
                    "connection handling finished"
                );
            }
            Err(error) => self.fail(&mut report, error),
        }
        report
    }

    fn fail(&self, report: &mut DispatchReport, error: DispatchError) {
        self.reporter.report_error(&report.context(), &error);
        report.errors.push(error);
        report.enter(DispatchState::Errored);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    format!("processor panicked: {detail}")
}

impl<E, P> fmt::Debug for Dispatcher<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("directory", &self.directory)
            .field("verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Capacity, ConnId, Pool, PoolId};
    use crate::error::BoxError;
    use crate::service::{DispatchContext, Upgraded};
    use std::num::NonZeroUsize;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// In-memory stream recording the close code it was closed with.
    #[derive(Debug, Default)]
    struct FakeStream {
        closed_with: Arc<Mutex<Option<u16>>>,
    }

    impl Transport for FakeStream {
        async fn close(self, error: &DispatchError) {
            if let Ok(mut slot) = self.closed_with.lock() {
                *slot = Some(error.close_code());
            }
        }
    }

    struct FailingUpgrade;

    impl Upgrader for FailingUpgrade {
        type Stream = FakeStream;

        async fn upgrade(self) -> Result<FakeStream, BoxError> {
            Err("handshake aborted".into())
        }
    }

    /// Environment counting how many processors saw it.
    #[derive(Debug, Default)]
    struct Room {
        visits: AtomicUsize,
    }

    /// Processor that fails when told to, and records membership seen
    /// from inside the HANDLED step.
    struct Scripted {
        fail: bool,
        seen: Mutex<Vec<ConnId>>,
    }

    impl Scripted {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ConnectionProcessor<FakeStream, Room> for Scripted {
        async fn handle(
            &self,
            conn: &mut Connection<FakeStream>,
            environment: &Room,
        ) -> Result<(), BoxError> {
            environment.visits.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(conn.id());
            }
            if self.fail {
                Err("chat protocol violated".into())
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug, Default)]
    struct Collecting {
        seen: Arc<Mutex<Vec<(DispatchState, u32)>>>,
        violations: Arc<AtomicUsize>,
    }

    impl ErrorReporter for Collecting {
        fn report_error(&self, ctx: &DispatchContext, error: &DispatchError) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((ctx.state, error.error_code()));
            }
            if error.is_invariant_violation() {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn directory(limit: usize, max_pools: Option<usize>) -> Arc<PoolDirectory<Room>> {
        Arc::new(
            PoolDirectory::new(move || -> Result<Pool<Room>, BoxError> {
                Ok(Pool::new(Capacity::from_limit(limit), Room::default()))
            })
            .with_max_pools(max_pools.and_then(NonZeroUsize::new)),
        )
    }

    #[tokio::test]
    async fn clean_dispatch_walks_every_state() {
        let dispatcher = Dispatcher::new(directory(2, None), Scripted::new(false));

        let report = dispatcher
            .dispatch(&HandshakeRequest::default(), Upgraded(FakeStream::default()))
            .await;

        assert!(report.is_clean());
        assert_eq!(
            report.transitions,
            [
                DispatchState::Pending,
                DispatchState::Verified,
                DispatchState::Upgraded,
                DispatchState::Assigned,
                DispatchState::Handled,
                DispatchState::Released,
            ]
        );
        assert!(report.pool_id.is_some());
        assert!(dispatcher.directory().is_empty().await);
    }

    #[tokio::test]
    async fn processor_failure_still_releases() {
        let reporter = Collecting::default();
        let seen = Arc::clone(&reporter.seen);
        let dispatcher =
            Dispatcher::new(directory(2, None), Scripted::new(true)).with_reporter(reporter);

        let report = dispatcher.run(Upgraded(FakeStream::default())).await;

        assert_eq!(report.state(), DispatchState::Released);
        assert!(report.reached(DispatchState::Handled));
        assert!(matches!(
            report.errors.as_slice(),
            [DispatchError::ProcessingFailed(_)]
        ));
        assert!(dispatcher.directory().is_empty().await);

        let Ok(seen) = seen.lock() else {
            panic!("reporter poisoned");
        };
        assert_eq!(seen.as_slice(), [(DispatchState::Assigned, 4001)]);
    }

    struct Panicking;

    impl ConnectionProcessor<FakeStream, Room> for Panicking {
        async fn handle(
            &self,
            _conn: &mut Connection<FakeStream>,
            _environment: &Room,
        ) -> Result<(), BoxError> {
            panic!("room state corrupted");
        }
    }

    #[tokio::test]
    async fn panicking_processor_still_releases() {
        let dir = directory(1, Some(1));
        let dispatcher = Dispatcher::new(Arc::clone(&dir), Panicking);

        let report = dispatcher.run(Upgraded(FakeStream::default())).await;

        assert_eq!(report.state(), DispatchState::Released);
        let [DispatchError::ProcessingFailed(source)] = report.errors.as_slice() else {
            panic!("expected a single processing failure");
        };
        assert!(source.to_string().contains("room state corrupted"));
        assert!(dir.is_empty().await);
        assert_eq!(dir.connection_count().await, 0);

        // The slot is free again under a one-pool ceiling.
        let next = dispatcher.run(Upgraded(FakeStream::default())).await;
        assert!(next.reached(DispatchState::Assigned));
    }

    /// Processor that releases its own connection, so the dispatcher's
    /// release finds nothing.
    struct SelfReleasing {
        directory: Arc<PoolDirectory<Room>>,
    }

    impl ConnectionProcessor<FakeStream, Room> for SelfReleasing {
        async fn handle(
            &self,
            conn: &mut Connection<FakeStream>,
            _environment: &Room,
        ) -> Result<(), BoxError> {
            self.directory.release(conn.id()).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_release_ends_errored() {
        let dir = directory(2, None);
        let reporter = Collecting::default();
        let seen = Arc::clone(&reporter.seen);
        let violations = Arc::clone(&reporter.violations);
        let dispatcher = Dispatcher::new(
            Arc::clone(&dir),
            SelfReleasing {
                directory: Arc::clone(&dir),
            },
        )
        .with_reporter(reporter);

        let report = dispatcher.run(Upgraded(FakeStream::default())).await;

        assert_eq!(report.state(), DispatchState::Errored);
        assert!(report.reached(DispatchState::Handled));
        assert!(!report.reached(DispatchState::Released));
        assert!(matches!(
            report.errors.last(),
            Some(DispatchError::NotFound(id)) if Some(*id) == report.conn_id
        ));
        assert!(dir.is_empty().await);

        let Ok(seen) = seen.lock() else {
            panic!("reporter poisoned");
        };
        assert_eq!(seen.as_slice(), [(DispatchState::Handled, 2002)]);
        assert_eq!(violations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_request_is_never_upgraded() {
        let reporter = Collecting::default();
        let seen = Arc::clone(&reporter.seen);
        let dispatcher = Dispatcher::new(directory(2, None), Scripted::new(false))
            .with_verifier(|_: &HandshakeRequest| -> Result<(), BoxError> {
                Err("access forbidden".into())
            })
            .with_reporter(reporter);

        let report = dispatcher
            .dispatch(&HandshakeRequest::default(), FailingUpgrade)
            .await;

        assert_eq!(
            report.transitions,
            [DispatchState::Pending, DispatchState::Errored]
        );
        assert!(report.conn_id.is_none());
        assert!(matches!(
            report.errors.as_slice(),
            [DispatchError::VerificationFailed(_)]
        ));
        let Ok(seen) = seen.lock() else {
            panic!("reporter poisoned");
        };
        assert_eq!(seen.as_slice(), [(DispatchState::Pending, 1001)]);
    }

    #[tokio::test]
    async fn upgrade_failure_skips_assignment() {
        let dispatcher = Dispatcher::new(directory(2, None), Scripted::new(false));

        let report = dispatcher.run(FailingUpgrade).await;

        assert_eq!(report.state(), DispatchState::Errored);
        assert!(!report.reached(DispatchState::Upgraded));
        assert!(matches!(
            report.errors.as_slice(),
            [DispatchError::UpgradeFailed(_)]
        ));
        assert!(dispatcher.processor().seen.lock().is_ok_and(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn full_directory_closes_stream_without_release() {
        let dir = directory(1, Some(1));
        let Ok(_) = dir.assign(ConnId::new()).await else {
            panic!("seed assignment failed");
        };
        let dispatcher = Dispatcher::new(Arc::clone(&dir), Scripted::new(false));

        let stream = FakeStream::default();
        let closed_with = Arc::clone(&stream.closed_with);
        let report = dispatcher.run(Upgraded(stream)).await;

        assert_eq!(report.state(), DispatchState::Errored);
        assert!(!report.reached(DispatchState::Assigned));
        assert!(matches!(
            report.errors.as_slice(),
            [DispatchError::DirectoryFull { max_pools: 1 }]
        ));
        assert_eq!(closed_with.lock().ok().and_then(|c| *c), Some(1013));
        assert_eq!(dir.connection_count().await, 1);
    }

    /// Processor that parks until released, so tests can observe the
    /// directory while connections are mid-HANDLED.
    struct Parked {
        gate: Arc<Semaphore>,
        entered: Arc<AtomicUsize>,
    }

    impl ConnectionProcessor<FakeStream, Room> for Parked {
        async fn handle(
            &self,
            _conn: &mut Connection<FakeStream>,
            environment: &Room,
        ) -> Result<(), BoxError> {
            environment.visits.fetch_add(1, Ordering::SeqCst);
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await?;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn siblings_share_environment_while_handling() {
        let gate = Arc::new(Semaphore::new(0));
        let entered = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Dispatcher::new(
            directory(2, None),
            Parked {
                gate: Arc::clone(&gate),
                entered: Arc::clone(&entered),
            },
        ));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                dispatcher.run(Upgraded(FakeStream::default())).await
            }));
        }
        while entered.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }

        let snapshot = dispatcher.directory().snapshot().await;
        let members: Vec<usize> = snapshot.pools.iter().map(|p| p.members).collect();
        assert_eq!(members, [2, 1]);

        gate.add_permits(3);
        let mut reports = Vec::new();
        for handle in handles {
            let Ok(report) = handle.await else {
                panic!("dispatch task panicked");
            };
            reports.push(report);
        }

        assert!(reports.iter().all(DispatchReport::is_clean));
        let pools: Vec<PoolId> = reports.iter().filter_map(|r| r.pool_id).collect();
        assert_eq!(pools.len(), 3);
        assert!(dispatcher.directory().is_empty().await);
    }
}
