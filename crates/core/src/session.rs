use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    auth::TokenGateway,
    client::{self, AnalyzeTransport},
    error::SessionError,
    handoff::{self, PendingAnalysis},
    parse::parse_analysis,
    progress::{Advisory, ProgressEstimator, TICK_INTERVAL},
    stream::StreamEvent,
    types::{AnalysisSession, AnalyzeOptions, ProgressEvent, Stage},
};

/// Pause between the network resolving and the bar snapping to 100, so the
/// jump is visible instead of the view flipping mid-animation.
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Ticks of synthetic "fetching" before the simulation switches to the
/// analyzing phase (~6 s at the 50 ms cadence).
const SIM_FETCH_TICKS: u32 = 120;

struct RunHandle {
    generation: u64,
    cancel_tx: broadcast::Sender<()>,
}

struct Inner {
    transport: Arc<dyn AnalyzeTransport>,
    gateway: Arc<dyn TokenGateway>,
    state_tx: watch::Sender<AnalysisSession>,
    advisory_tx: watch::Sender<Option<Advisory>>,
    run: Mutex<Option<RunHandle>>,
    next_generation: AtomicU64,
    count_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
}

/// Single owner of the analysis lifecycle: submits the request, keeps the
/// progress display moving while the backend works, normalizes the payload
/// and commits exactly one terminal transition per attempt. Everyone else
/// reads snapshots off the watch channel and dispatches
/// `start_analysis`/`cancel`.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn AnalyzeTransport>, gateway: Arc<dyn TokenGateway>) -> Self {
        let (state_tx, _) = watch::channel(AnalysisSession::default());
        let (advisory_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                transport,
                gateway,
                state_tx,
                advisory_tx,
                run: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                count_tx: Mutex::new(None),
            }),
        }
    }

    /// Fire-and-forget "analysis started" signal consumed by unrelated
    /// review-prompt logic; send failures are ignored.
    pub fn set_count_signal(&self, count_tx: mpsc::UnboundedSender<()>) {
        *self.inner.count_tx.lock().expect("count lock poisoned") = Some(count_tx);
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSession> {
        self.inner.state_tx.subscribe()
    }

    pub fn advisories(&self) -> watch::Receiver<Option<Advisory>> {
        self.inner.advisory_tx.subscribe()
    }

    pub fn snapshot(&self) -> AnalysisSession {
        self.inner.state_tx.borrow().clone()
    }

    /// Consume a pending-analysis handoff record left by a trigger surface.
    /// The record is removed before it is returned, so it fires at most once.
    pub async fn take_pending(&self) -> Option<PendingAnalysis> {
        handoff::take_pending().await
    }

    pub async fn start_analysis(&self, video_id: &str, title: Option<String>) {
        self.start_analysis_with(video_id, title, AnalyzeOptions::default())
            .await;
    }

    /// Drive one full analysis attempt over `POST /analyze`, simulating
    /// progress locally while the backend works. Runs to a terminal state
    /// unless cancelled or replaced.
    pub async fn start_analysis_with(
        &self,
        video_id: &str,
        title: Option<String>,
        opts: AnalyzeOptions,
    ) {
        let (generation, mut cancel_rx) = self.begin_run(video_id, title);

        let Some(token) = self.inner.gateway.get_token().await else {
            self.commit_error(generation, SessionError::AuthRequired);
            return;
        };

        let sim = tokio::spawn(simulate_progress(
            self.clone(),
            generation,
            self.subscribe_cancel(generation),
        ));

        let outcome = tokio::select! {
            _ = cancel_rx.recv() => None,
            result = self.inner.transport.analyze(video_id, &opts, &token) => Some(result),
        };

        // The simulation must be fully stopped before any terminal commit;
        // a late tick would repaint progress over a finished session.
        sim.abort();
        let _ = sim.await;

        let Some(outcome) = outcome else {
            return;
        };

        match outcome {
            Ok(response) => {
                let payload = response.result.unwrap_or(Value::Null);
                self.finish_with_payload(generation, payload).await;
            }
            Err(error) => {
                if error.status() == Some(401) {
                    self.inner.gateway.clear_token().await;
                }
                self.commit_error(generation, error);
            }
        }
    }

    /// SSE variant: real server progress events drive the estimator, with
    /// the local tick interpolating between them.
    pub async fn start_analysis_streamed(
        &self,
        video_id: &str,
        title: Option<String>,
        opts: AnalyzeOptions,
    ) {
        let (generation, mut cancel_rx) = self.begin_run(video_id, title);

        let Some(token) = self.inner.gateway.get_token().await else {
            self.commit_error(generation, SessionError::AuthRequired);
            return;
        };

        let mut events = match self
            .inner
            .transport
            .open_stream(video_id, &opts, &token)
            .await
        {
            Ok(events) => events,
            Err(error) => {
                if error.status() == Some(401) {
                    self.inner.gateway.clear_token().await;
                }
                self.commit_error(generation, error);
                return;
            }
        };

        let mut estimator = ProgressEstimator::new();
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut payload: Option<Value> = None;
        let mut failure: Option<SessionError> = None;

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => return,
                _ = interval.tick() => {
                    let percent = estimator.tick();
                    if !self.publish_progress(generation, percent, estimator.stage()) {
                        return;
                    }
                    self.publish_advisory(generation, estimator.advisory());
                }
                event = events.recv() => match event {
                    Some(StreamEvent::Progress(progress)) => estimator.observe(&progress),
                    Some(StreamEvent::Comments(comments)) => {
                        tracing::debug!(count = comments.len(), "received comment batch");
                    }
                    Some(StreamEvent::Result(value)) => payload = Some(value),
                    Some(StreamEvent::Error { message }) => {
                        failure = Some(client::classify_failure(500, message));
                        break;
                    }
                    Some(StreamEvent::Done) | None => break,
                },
            }
        }

        match (failure, payload) {
            (Some(error), _) => self.commit_error(generation, error),
            (None, Some(payload)) => self.finish_with_payload(generation, payload).await,
            (None, None) => self.commit_error(
                generation,
                SessionError::Http {
                    status: 200,
                    message: "stream ended without a result".to_string(),
                },
            ),
        }
    }

    /// Idempotent: stops the simulation and any in-flight request, resets
    /// the session to idle without touching the success path.
    pub fn cancel(&self) {
        let handle = {
            let mut run = self.inner.run.lock().expect("run lock poisoned");
            run.take()
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.cancel_tx.send(());

        self.inner.state_tx.send_modify(|session| {
            session.stage = Stage::Idle;
            session.result = None;
            session.error = None;
            session.progress_current = 0.0;
        });
        let _ = self.inner.advisory_tx.send_replace(None);
    }

    /// Allocate a new run, cancel whatever was in flight, reset the session
    /// to a fresh fetching state.
    fn begin_run(&self, video_id: &str, title: Option<String>) -> (u64, broadcast::Receiver<()>) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = broadcast::channel(1);

        {
            let mut run = self.inner.run.lock().expect("run lock poisoned");
            if let Some(previous) = run.take() {
                let _ = previous.cancel_tx.send(());
            }
            *run = Some(RunHandle {
                generation,
                cancel_tx,
            });
        }

        let mut session = AnalysisSession::new(video_id, title);
        session.stage = Stage::Fetching;
        session.progress_current = 1.0;
        self.inner.state_tx.send_replace(session);
        let _ = self.inner.advisory_tx.send_replace(None);

        if let Some(count_tx) = self.inner.count_tx.lock().expect("count lock poisoned").as_ref() {
            let _ = count_tx.send(());
        }

        (generation, cancel_rx)
    }

    fn subscribe_cancel(&self, generation: u64) -> broadcast::Receiver<()> {
        let run = self.inner.run.lock().expect("run lock poisoned");
        match run.as_ref() {
            Some(handle) if handle.generation == generation => handle.cancel_tx.subscribe(),
            // Already replaced or cancelled; hand back a receiver that
            // resolves immediately.
            _ => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    async fn finish_with_payload(&self, generation: u64, payload: Value) {
        tokio::time::sleep(SETTLE_DELAY).await;
        if !self.publish_progress(generation, 100.0, Stage::Analyzing) {
            return;
        }

        let result = parse_analysis(&payload);
        self.commit_terminal(generation, |session| {
            session.stage = Stage::Complete;
            session.progress_current = 100.0;
            session.result = Some(result);
            session.error = None;
        });
    }

    fn commit_error(&self, generation: u64, error: SessionError) {
        self.commit_terminal(generation, |session| {
            session.stage = Stage::Error;
            session.result = None;
            session.error = Some(error);
        });
    }

    /// Terminal commits consume the run handle, so exactly one terminal
    /// transition happens per attempt and stale runs commit nothing.
    fn commit_terminal(&self, generation: u64, apply: impl FnOnce(&mut AnalysisSession)) -> bool {
        {
            let mut run = self.inner.run.lock().expect("run lock poisoned");
            match run.as_ref() {
                Some(handle) if handle.generation == generation => {
                    *run = None;
                }
                _ => return false,
            }
        }
        self.inner.state_tx.send_modify(apply);
        let _ = self.inner.advisory_tx.send_replace(None);
        true
    }

    /// Non-terminal update from the ticking side; gated on the run still
    /// being current so a late tick cannot repaint a finished session.
    fn publish_progress(&self, generation: u64, percent: f64, stage: Stage) -> bool {
        {
            let run = self.inner.run.lock().expect("run lock poisoned");
            match run.as_ref() {
                Some(handle) if handle.generation == generation => {}
                _ => return false,
            }
        }
        self.inner.state_tx.send_modify(|session| {
            session.progress_current = percent;
            if stage.is_active() {
                session.stage = stage;
            }
        });
        true
    }

    fn publish_advisory(&self, generation: u64, advisory: Option<Advisory>) {
        {
            let run = self.inner.run.lock().expect("run lock poisoned");
            match run.as_ref() {
                Some(handle) if handle.generation == generation => {}
                _ => return,
            }
        }
        if *self.inner.advisory_tx.borrow() != advisory {
            let _ = self.inner.advisory_tx.send_replace(advisory);
        }
    }
}

/// Local progress simulation: the backend is opaque until it answers, so a
/// synthetic two-phase plan keeps the display moving. Fetching creeps
/// toward its ceiling, then a synthetic switch to analyzing opens the upper
/// band, capped at 98 so real completion stays distinguishable.
async fn simulate_progress(
    controller: SessionController,
    generation: u64,
    mut cancel_rx: broadcast::Receiver<()>,
) {
    let mut estimator = ProgressEstimator::new();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel_rx.recv() => return,
            _ = interval.tick() => {
                ticks += 1;
                if ticks == SIM_FETCH_TICKS {
                    estimator.observe(&ProgressEvent {
                        stage: Stage::Analyzing,
                        current: 55.0,
                        total: 100.0,
                        message: None,
                    });
                }
                let percent = estimator.tick();
                if !controller.publish_progress(generation, percent, estimator.stage()) {
                    return;
                }
                controller.publish_advisory(generation, estimator.advisory());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::RwLock;

    use crate::client::AnalyzeResponse;

    enum Script {
        Succeed(Value),
        SucceedAfter(Duration, Value),
        Fail(SessionError),
        Stream(Vec<StreamEvent>),
    }

    struct MockTransport {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Script>>,
    }

    impl MockTransport {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_script(&self) -> Script {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }
    }

    #[async_trait]
    impl AnalyzeTransport for MockTransport {
        async fn analyze(
            &self,
            _video_id: &str,
            _opts: &AnalyzeOptions,
            _token: &str,
        ) -> Result<AnalyzeResponse, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_script() {
                Script::Succeed(value) => Ok(AnalyzeResponse {
                    success: true,
                    result: Some(value),
                    comments: None,
                    error: None,
                }),
                Script::SucceedAfter(delay, value) => {
                    tokio::time::sleep(delay).await;
                    Ok(AnalyzeResponse {
                        success: true,
                        result: Some(value),
                        comments: None,
                        error: None,
                    })
                }
                Script::Fail(error) => Err(error),
                Script::Stream(_) => panic!("stream script on the POST path"),
            }
        }

        async fn open_stream(
            &self,
            _video_id: &str,
            _opts: &AnalyzeOptions,
            _token: &str,
        ) -> Result<mpsc::Receiver<StreamEvent>, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_script() {
                Script::Stream(events) => {
                    let (tx, rx) = mpsc::channel(32);
                    tokio::spawn(async move {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    });
                    Ok(rx)
                }
                Script::Fail(error) => Err(error),
                _ => panic!("non-stream script on the stream path"),
            }
        }
    }

    struct StaticGateway {
        token: RwLock<Option<String>>,
        clears: AtomicUsize,
    }

    impl StaticGateway {
        fn with_token(token: &str) -> Arc<Self> {
            Arc::new(Self {
                token: RwLock::new(Some(token.to_string())),
                clears: AtomicUsize::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                token: RwLock::new(None),
                clears: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenGateway for StaticGateway {
        async fn get_token(&self) -> Option<String> {
            self.token.read().await.clone()
        }

        async fn set_token(&self, token: String, _api_base_url: String) {
            *self.token.write().await = Some(token);
        }

        async fn clear_token(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
            *self.token.write().await = None;
        }
    }

    fn controller(transport: Arc<MockTransport>, gateway: Arc<StaticGateway>) -> SessionController {
        SessionController::new(transport, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_fails_without_touching_the_network() {
        let transport = MockTransport::new(vec![]);
        let ctl = controller(Arc::clone(&transport), StaticGateway::empty());

        ctl.start_analysis("abc123", None).await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Error);
        assert!(!session.is_analyzing());
        assert_eq!(session.error, Some(SessionError::AuthRequired));
        assert!(session.result.is_none());
        assert!(
            session
                .error
                .as_ref()
                .unwrap()
                .to_string()
                .contains("Authentication required")
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fenced_payload_completes_with_full_progress() {
        let transport =
            MockTransport::new(vec![Script::Succeed(json!("```json\n{\"summary\":\"ok\"}\n```"))]);
        let ctl = controller(Arc::clone(&transport), StaticGateway::with_token("tok"));

        ctl.start_analysis("abc123", Some("a video".to_string()))
            .await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Complete);
        assert_eq!(session.progress_current, 100.0);
        assert_eq!(session.result.as_ref().unwrap().summary, "ok");
        assert!(session.error.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_surfaces_guidance() {
        let transport = MockTransport::new(vec![Script::Fail(SessionError::unreachable(
            "https://api.comlens.app",
            "connection refused",
        ))]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis("abc123", None).await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Error);
        assert!(session.result.is_none());
        let message = session.error.unwrap().to_string();
        assert!(message.contains("internet connection"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_preempts_a_slow_request() {
        let transport = MockTransport::new(vec![Script::SucceedAfter(
            Duration::from_secs(5),
            json!({"summary": "too late"}),
        )]);
        let ctl = controller(Arc::clone(&transport), StaticGateway::with_token("tok"));

        let runner = ctl.clone();
        let handle =
            tokio::spawn(async move { runner.start_analysis("abc123", None).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ctl.snapshot().is_analyzing());
        ctl.cancel();

        let session = ctl.snapshot();
        assert!(!session.is_analyzing());
        assert!(session.result.is_none());
        assert!(session.error.is_none());

        // Even when the mocked request later resolves, it must not touch
        // session state.
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Idle);
        assert!(session.result.is_none());
        assert!(session.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let transport = MockTransport::new(vec![]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));
        ctl.cancel();
        ctl.cancel();
        assert_eq!(ctl.snapshot().stage, Stage::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_one_terminal_state_per_attempt() {
        let transport = MockTransport::new(vec![Script::Succeed(json!({"summary": "done"}))]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis("abc123", None).await;

        let session = ctl.snapshot();
        assert!(session.result.is_some() ^ session.error.is_some());
        assert!(!session.is_analyzing());

        // Terminal state consumed the run; cancel afterwards is a no-op.
        ctl.cancel();
        assert_eq!(ctl.snapshot().stage, Stage::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_advances_and_switches_phase_while_waiting() {
        let transport = MockTransport::new(vec![Script::SucceedAfter(
            Duration::from_secs(10),
            json!({"summary": "slow"}),
        )]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        let runner = ctl.clone();
        let handle =
            tokio::spawn(async move { runner.start_analysis("abc123", None).await });

        tokio::time::sleep(Duration::from_secs(2)).await;
        let early = ctl.snapshot();
        assert_eq!(early.stage, Stage::Fetching);
        assert!(early.progress_current > 1.0);
        assert!(early.progress_current <= 48.0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let late = ctl.snapshot();
        assert_eq!(late.stage, Stage::Analyzing);
        assert!(late.progress_current > early.progress_current);
        assert!(late.progress_current <= 98.0);

        handle.await.unwrap();
        assert_eq!(ctl.snapshot().stage, Stage::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_failure_keeps_its_actionable_message() {
        let transport = MockTransport::new(vec![Script::Fail(SessionError::QuotaExceeded {
            message: "0 credits left".to_string(),
        })]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis("abc123", None).await;

        let message = ctl.snapshot().error.unwrap().to_string();
        assert!(message.contains("Top up"));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_response_invalidates_the_token() {
        let transport = MockTransport::new(vec![Script::Fail(SessionError::Http {
            status: 401,
            message: "token expired".to_string(),
        })]);
        let gateway = StaticGateway::with_token("tok");
        let ctl = controller(Arc::clone(&transport), Arc::clone(&gateway));

        ctl.start_analysis("abc123", None).await;

        assert_eq!(gateway.clears.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.get_token().await, None);

        // The next attempt fails the auth precondition without a request.
        ctl.start_analysis("abc123", None).await;
        assert_eq!(ctl.snapshot().error, Some(SessionError::AuthRequired));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_attempt_does_not_taint_the_next() {
        let transport = MockTransport::new(vec![
            Script::Fail(SessionError::Http {
                status: 500,
                message: "boom".to_string(),
            }),
            Script::Succeed(json!({"summary": "second try"})),
        ]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis("abc123", None).await;
        assert_eq!(ctl.snapshot().stage, Stage::Error);

        ctl.start_analysis("abc123", None).await;
        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Complete);
        assert_eq!(session.result.unwrap().summary, "second try");
        assert!(session.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn count_signal_fires_per_attempt() {
        let transport = MockTransport::new(vec![Script::Succeed(json!({"summary": "ok"}))]);
        let (count_tx, mut count_rx) = mpsc::unbounded_channel();
        let ctl = SessionController::new(transport, StaticGateway::with_token("tok"));
        ctl.set_count_signal(count_tx);

        ctl.start_analysis("abc123", None).await;
        assert!(count_rx.try_recv().is_ok());
        assert!(count_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_run_uses_server_progress_and_result() {
        let transport = MockTransport::new(vec![Script::Stream(vec![
            StreamEvent::Progress(ProgressEvent {
                stage: Stage::Fetching,
                current: 40.0,
                total: 100.0,
                message: None,
            }),
            StreamEvent::Progress(ProgressEvent {
                stage: Stage::Analyzing,
                current: 80.0,
                total: 100.0,
                message: None,
            }),
            StreamEvent::Result(json!("```json\n{\"summary\":\"streamed\"}\n```")),
            StreamEvent::Done,
        ])]);
        let ctl = controller(Arc::clone(&transport), StaticGateway::with_token("tok"));

        ctl.start_analysis_streamed("abc123", None, AnalyzeOptions::default())
            .await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Complete);
        assert_eq!(session.progress_current, 100.0);
        assert_eq!(session.result.unwrap().summary, "streamed");
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_error_event_is_terminal_and_classified() {
        let transport = MockTransport::new(vec![Script::Stream(vec![StreamEvent::Error {
            message: "insufficient credits".to_string(),
        }])]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis_streamed("abc123", None, AnalyzeOptions::default())
            .await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Error);
        assert!(matches!(
            session.error,
            Some(SessionError::QuotaExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_without_result_is_an_error() {
        let transport = MockTransport::new(vec![Script::Stream(vec![StreamEvent::Done])]);
        let ctl = controller(transport, StaticGateway::with_token("tok"));

        ctl.start_analysis_streamed("abc123", None, AnalyzeOptions::default())
            .await;

        let session = ctl.snapshot();
        assert_eq!(session.stage, Stage::Error);
        assert!(
            session
                .error
                .unwrap()
                .to_string()
                .contains("stream ended without a result")
        );
    }
}
