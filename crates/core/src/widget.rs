//! Client-facing chat widget and the visibility controller shared with the
//! page trigger that opens it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::flows::{
    FlowEngine, FlowError, FlowState, FlowType, Resolution, SessionId, StepInput, StepResult,
    SubmissionTicket, TranscriptEntry,
};
use crate::submission::SubmissionCoordinator;

/// Open/closed flag observed by the widget and toggled by page triggers.
#[derive(Clone, Debug)]
pub struct WidgetVisibility {
    sender: Arc<watch::Sender<bool>>,
}

impl WidgetVisibility {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    pub fn open(&self) {
        self.sender.send_replace(true);
    }

    pub fn close(&self) {
        self.sender.send_replace(false);
    }

    pub fn toggle(&self) {
        self.sender.send_modify(|open| *open = !*open);
    }

    pub fn is_open(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for WidgetVisibility {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one visitor action: the entries it appended and where the flow
/// ended up.
#[derive(Clone, Debug, Serialize)]
pub struct WidgetReply {
    pub state: FlowState,
    pub entries: Vec<TranscriptEntry>,
    #[serde(skip)]
    pub step: Option<StepResult>,
    #[serde(skip)]
    pub resolution: Option<Resolution>,
}

pub struct ChatWidget {
    flow_type: FlowType,
    engine: Mutex<FlowEngine>,
    coordinator: Arc<SubmissionCoordinator>,
    visibility: WidgetVisibility,
}

impl ChatWidget {
    pub fn new(
        flow_type: FlowType,
        engine: FlowEngine,
        coordinator: Arc<SubmissionCoordinator>,
        visibility: WidgetVisibility,
    ) -> Self {
        Self { flow_type, engine: Mutex::new(engine), coordinator, visibility }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    pub fn visibility(&self) -> &WidgetVisibility {
        &self.visibility
    }

    pub fn session_id(&self) -> SessionId {
        self.engine().session_id().clone()
    }

    pub fn correlation_id(&self) -> String {
        self.engine().correlation_id().to_string()
    }

    pub fn state(&self) -> FlowState {
        self.engine().state().clone()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.engine().transcript().entries().to_vec()
    }

    /// Shows the widget, starting the flow unless one is already running.
    pub fn open(&self) -> Result<Vec<TranscriptEntry>, FlowError> {
        self.visibility.open();
        self.ensure_started()?;
        Ok(self.transcript())
    }

    /// Hides the widget and abandons the flow. An in-flight submission keeps
    /// running; its outcome is discarded.
    pub fn close(&self) {
        self.visibility.close();
        self.engine().abandon();
    }

    /// Starts the flow over, discarding any finished run.
    pub fn restart(&self) -> Result<Vec<TranscriptEntry>, FlowError> {
        self.engine().start(self.flow_type)?;
        Ok(self.transcript())
    }

    pub async fn send(&self, input: impl Into<StepInput>) -> Result<WidgetReply, FlowError> {
        let input = input.into();
        self.drive(|engine| engine.submit_step_input(input)).await
    }

    pub async fn skip(&self) -> Result<WidgetReply, FlowError> {
        self.drive(FlowEngine::skip).await
    }

    /// Re-submits a record that the rate limiter refused earlier.
    pub async fn retry(&self) -> Result<WidgetReply, FlowError> {
        let (offset, ticket) = {
            let mut engine = self.engine();
            let offset = engine.transcript().len();
            (offset, engine.retry_submission()?)
        };
        let resolution = self.submit(ticket).await;
        Ok(self.reply(offset, None, Some(resolution)))
    }

    /// Follows the visibility flag so page triggers can open and close the
    /// widget without holding a reference to it.
    pub fn spawn_visibility_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let widget = Arc::clone(self);
        let mut receiver = self.visibility.subscribe();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let open = *receiver.borrow_and_update();
                if open {
                    if let Err(error) = widget.ensure_started() {
                        debug!(
                            event_name = "widget.open_ignored",
                            session_id = %widget.session_id(),
                            error = %error,
                            "widget opened while a submission is pending"
                        );
                    }
                } else {
                    widget.engine().abandon();
                }
            }
        })
    }

    fn ensure_started(&self) -> Result<(), FlowError> {
        let mut engine = self.engine();
        if matches!(engine.state(), FlowState::NotStarted | FlowState::Abandoned) {
            engine.start(self.flow_type)?;
        }
        Ok(())
    }

    async fn drive<F>(&self, action: F) -> Result<WidgetReply, FlowError>
    where
        F: FnOnce(&mut FlowEngine) -> Result<StepResult, FlowError>,
    {
        let (offset, step) = {
            let mut engine = self.engine();
            let offset = engine.transcript().len();
            (offset, action(&mut engine)?)
        };

        let resolution = match &step {
            StepResult::ReadyToSubmit(ticket) => Some(self.submit(ticket.clone()).await),
            _ => None,
        };
        Ok(self.reply(offset, Some(step), resolution))
    }

    async fn submit(&self, ticket: SubmissionTicket) -> Resolution {
        let outcome = self.coordinator.submit(&ticket.request).await;
        let resolution = self.engine().resolve_submission(ticket.generation, &outcome);
        if resolution == Resolution::Stale {
            debug!(
                event_name = "widget.stale_outcome_discarded",
                session_id = %ticket.request.session_id,
                correlation_id = %ticket.request.correlation_id,
                outcome = outcome.kind.as_str(),
                "submission finished after the flow was abandoned"
            );
        }
        resolution
    }

    fn reply(
        &self,
        offset: usize,
        step: Option<StepResult>,
        resolution: Option<Resolution>,
    ) -> WidgetReply {
        let engine = self.engine();
        WidgetReply {
            state: engine.state().clone(),
            entries: engine.transcript().since(offset).to_vec(),
            step,
            resolution,
        }
    }

    fn engine(&self) -> MutexGuard<'_, FlowEngine> {
        match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::audit::NoopAuditSink;
    use crate::flows::{EngineSettings, FlowCatalog, FlowEngine, FlowState, FlowType, Resolution};
    use crate::submission::{
        CoordinatorSettings, ManualClock, OutcomeKind, RateLimitConfig, RateLimiter,
        SubmissionCoordinator,
    };
    use crate::test_support::{FakeRelay, FakeStore};

    use super::{ChatWidget, WidgetVisibility};

    fn widget(store: &FakeStore, visibility: &WidgetVisibility) -> ChatWidget {
        let audit = Arc::new(NoopAuditSink);
        let catalog = FlowCatalog::builtin().expect("builtin catalog");
        let engine = FlowEngine::new(catalog, EngineSettings::default(), audit.clone());
        let coordinator = SubmissionCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(FakeRelay::default()),
            RateLimiter::with_clock(RateLimitConfig::default(), Arc::new(ManualClock::new())),
            CoordinatorSettings { timeout: Duration::from_secs(5), ..CoordinatorSettings::default() },
            audit,
        );
        ChatWidget::new(FlowType::Connect, engine, Arc::new(coordinator), visibility.clone())
    }

    #[test]
    fn visibility_toggle_flips_state() {
        let visibility = WidgetVisibility::new();
        assert!(!visibility.is_open());
        visibility.toggle();
        assert!(visibility.is_open());
        visibility.close();
        assert!(!visibility.is_open());
    }

    #[tokio::test]
    async fn widget_drives_a_flow_to_completion() {
        let store = FakeStore::default();
        let visibility = WidgetVisibility::new();
        let widget = widget(&store, &visibility);

        let opening = widget.open().expect("open");
        assert_eq!(opening.len(), 1);
        assert!(visibility.is_open());

        widget.send("Ana").await.expect("name");
        widget.send("ana@x.com").await.expect("email");
        let reply = widget.send("need help").await.expect("help");

        assert_eq!(
            reply.resolution,
            Some(Resolution::Completed { flow_type: FlowType::Connect, outcome: OutcomeKind::Primary })
        );
        assert_eq!(reply.state, FlowState::Completed { outcome: OutcomeKind::Primary });
        assert_eq!(reply.entries.first().map(|entry| entry.text.as_str()), Some("need help"));
        assert_eq!(store.leads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_mid_submission_discards_the_outcome() {
        let store = FakeStore::default();
        store.delay(Duration::from_millis(500));
        let visibility = WidgetVisibility::new();
        let widget = Arc::new(widget(&store, &visibility));

        widget.open().expect("open");
        widget.send("Ana").await.expect("name");
        widget.send("ana@x.com").await.expect("email");

        let sending = {
            let widget = Arc::clone(&widget);
            tokio::spawn(async move { widget.send("need help").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        widget.close();
        assert_eq!(widget.state(), FlowState::Abandoned);

        let reply = sending.await.expect("task joins").expect("send handled");
        assert_eq!(reply.resolution, Some(Resolution::Stale));
        assert_eq!(widget.state(), FlowState::Abandoned);
        assert!(widget.transcript().is_empty());
        assert_eq!(store.leads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reopened_widget_completes_while_earlier_run_is_in_flight() {
        let store = FakeStore::default();
        store.delay(Duration::from_millis(500));
        let visibility = WidgetVisibility::new();
        let widget = Arc::new(widget(&store, &visibility));

        widget.open().expect("open");
        widget.send("Ana").await.expect("name");
        widget.send("ana@x.com").await.expect("email");
        let earlier = {
            let widget = Arc::clone(&widget);
            tokio::spawn(async move { widget.send("need help").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        widget.close();
        widget.open().expect("reopen");
        widget.send("Bea").await.expect("name");
        widget.send("bea@x.com").await.expect("email");
        let reply = widget.send("call me").await.expect("help");

        assert_eq!(
            reply.resolution,
            Some(Resolution::Completed { flow_type: FlowType::Connect, outcome: OutcomeKind::Primary })
        );
        assert_eq!(widget.state(), FlowState::Completed { outcome: OutcomeKind::Primary });

        let earlier = earlier.await.expect("task joins").expect("send handled");
        assert_eq!(earlier.resolution, Some(Resolution::Stale));
        assert_eq!(widget.state(), FlowState::Completed { outcome: OutcomeKind::Primary });
        let mut names: Vec<_> = store.leads().into_iter().map(|lead| lead.name).collect();
        names.sort();
        assert_eq!(names, vec!["Ana".to_string(), "Bea".to_string()]);
    }

    #[tokio::test]
    async fn page_trigger_opens_and_closes_through_visibility() {
        let store = FakeStore::default();
        let trigger = WidgetVisibility::new();
        let widget = Arc::new(widget(&store, &trigger));
        let listener = widget.spawn_visibility_listener();

        trigger.open();
        for _ in 0..50 {
            if widget.state() != FlowState::NotStarted {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(widget.state(), FlowState::InProgress { step_index: 0 });

        trigger.close();
        for _ in 0..50 {
            if widget.state() == FlowState::Abandoned {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(widget.state(), FlowState::Abandoned);
        listener.abort();
    }
}
