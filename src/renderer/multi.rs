//! Fan-out renderer presenting a [`RendererSet`] as one [`Renderer`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};
use ui_renderer::{
    AppConfig, CancelToken, EventData, EventManager, IpcManager, Renderer, RendererError,
};

use super::RendererSet;

enum Background {
    Running {
        name: String,
        handle: JoinHandle<Result<(), RendererError>>,
    },
    Failed(RendererError),
}

/// Forwards every operation to its members in order and aggregates results.
///
/// - fallible broadcasts stop at the first failing member;
/// - void broadcasts reach every member;
/// - selections return the first non-empty answer;
/// - `run` keeps the primary on the calling thread.
pub struct MultiRenderer {
    name: String,
    set: RendererSet,
}

impl MultiRenderer {
    #[must_use]
    pub fn new(set: RendererSet) -> Self {
        Self::named("multi", set)
    }

    #[must_use]
    pub fn named(name: impl Into<String>, set: RendererSet) -> Self {
        Self {
            name: name.into(),
            set,
        }
    }

    #[must_use]
    pub fn set(&self) -> &RendererSet {
        &self.set
    }

    fn broadcast(
        &self,
        operation: &'static str,
        mut apply: impl FnMut(&dyn Renderer) -> Result<(), RendererError>,
    ) -> Result<(), RendererError> {
        for renderer in self.set.iter() {
            if let Err(error) = apply(renderer.as_ref()) {
                warn!(
                    fanout = %self.name,
                    renderer = renderer.name(),
                    operation,
                    %error,
                    "broadcast stopped at failing renderer"
                );
                return Err(error);
            }
        }
        Ok(())
    }

    fn first_selection(
        &self,
        select: impl Fn(&dyn Renderer) -> Option<String>,
    ) -> Option<String> {
        self.set
            .iter()
            .find_map(|renderer| select(renderer.as_ref()).filter(|value| !value.is_empty()))
    }

    fn spawn_secondary(
        renderer: &Arc<dyn Renderer>,
        cancel: &CancelToken,
        escalate: bool,
    ) -> Background {
        let name = renderer.name().to_string();
        let worker = Arc::clone(renderer);
        let cancel = cancel.clone();
        let thread_name = name.clone();
        let spawned = thread::Builder::new()
            .name(format!("renderer-{name}"))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| worker.run(&cancel)))
                    .unwrap_or_else(|_| {
                        Err(RendererError::Panicked {
                            renderer: thread_name.clone(),
                            operation: "run",
                        })
                    });
                if let Err(error) = &result {
                    if escalate {
                        error!(renderer = %thread_name, %error, "background renderer failed; stopping");
                        cancel.cancel();
                    }
                }
                result
            });

        match spawned {
            Ok(handle) => Background::Running { name, handle },
            Err(error) => {
                if escalate {
                    error!(renderer = %name, %error, "background renderer could not be started; stopping");
                }
                Background::Failed(RendererError::run(
                    name,
                    format!("failed to spawn run thread: {error}"),
                ))
            }
        }
    }

    fn spawn_all(&self, cancel: &CancelToken, escalate: bool) -> Vec<Background> {
        let background: Vec<Background> = self
            .set
            .secondaries()
            .iter()
            .map(|renderer| Self::spawn_secondary(renderer, cancel, escalate))
            .collect();
        if escalate && background.iter().any(|outcome| matches!(outcome, Background::Failed(_))) {
            cancel.cancel();
        }
        background
    }

    /// Joins every secondary and returns the first failure in list order.
    fn join_all(background: Vec<Background>) -> Result<(), RendererError> {
        let mut first_error = None;
        for outcome in background {
            let result = match outcome {
                Background::Running { name, handle } => match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(RendererError::Panicked {
                        renderer: name,
                        operation: "run",
                    }),
                },
                Background::Failed(error) => Err(error),
            };
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Runs the set the way an application needs it run.
    ///
    /// A failing secondary fires `cancel` so the primary is asked to exit.
    /// Once the primary returns, for any reason, `cancel` fires and every
    /// secondary is joined before this returns.
    pub fn run_supervised(&self, cancel: &CancelToken) -> Result<(), RunFailure> {
        let background = self.spawn_all(cancel, true);

        let primary = self.set.primary().run(cancel);
        cancel.cancel();
        let secondaries = Self::join_all(background);

        primary.map_err(RunFailure::Primary)?;
        secondaries.map_err(RunFailure::Background)
    }
}

/// Which side of a supervised run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    Primary(RendererError),
    Background(RendererError),
}

impl RunFailure {
    #[must_use]
    pub fn into_inner(self) -> RendererError {
        match self {
            Self::Primary(error) | Self::Background(error) => error,
        }
    }
}

impl Renderer for MultiRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(
        &self,
        config: &AppConfig,
        ipc: Arc<dyn IpcManager>,
        events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError> {
        for renderer in self.set.iter() {
            debug!(fanout = %self.name, renderer = renderer.name(), "initialising renderer");
            renderer.initialise(config, Arc::clone(&ipc), Arc::clone(&events))?;
        }
        Ok(())
    }

    fn run(&self, cancel: &CancelToken) -> Result<(), RendererError> {
        let background = self.spawn_all(cancel, false);

        // Secondaries keep running if the primary fails; `run_supervised` is
        // the variant that stops and joins them.
        self.set.primary().run(cancel)?;

        Self::join_all(background)
    }

    fn new_binding(&self, name: &str) -> Result<(), RendererError> {
        self.broadcast("new_binding", |renderer| renderer.new_binding(name))
    }

    fn callback(&self, data: &str) -> Result<(), RendererError> {
        self.broadcast("callback", |renderer| renderer.callback(data))
    }

    fn notify_event(&self, event: &EventData) -> Result<(), RendererError> {
        self.broadcast("notify_event", |renderer| renderer.notify_event(event))
    }

    fn select_file(&self) -> Option<String> {
        self.first_selection(|renderer| renderer.select_file())
    }

    fn select_directory(&self) -> Option<String> {
        self.first_selection(|renderer| renderer.select_directory())
    }

    fn select_save_file(&self) -> Option<String> {
        self.first_selection(|renderer| renderer.select_save_file())
    }

    fn set_colour(&self, colour: &str) -> Result<(), RendererError> {
        self.broadcast("set_colour", |renderer| renderer.set_colour(colour))
    }

    fn enable_console(&self) {
        for renderer in self.set.iter() {
            renderer.enable_console();
        }
    }

    fn fullscreen(&self) {
        for renderer in self.set.iter() {
            renderer.fullscreen();
        }
    }

    fn unfullscreen(&self) {
        for renderer in self.set.iter() {
            renderer.unfullscreen();
        }
    }

    fn set_title(&self, title: &str) {
        for renderer in self.set.iter() {
            renderer.set_title(title);
        }
    }

    fn close(&self) {
        for renderer in self.set.iter() {
            renderer.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use serde_json::json;
    use ui_renderer::{
        AppConfig, CancelToken, EventData, EventManager, IpcManager, Renderer, RendererError,
    };
    use ui_renderer_mock::{CallLog, MockRenderer, RunScript};

    use super::{MultiRenderer, RunFailure};
    use crate::event::EventHub;
    use crate::ipc::IpcDispatcher;
    use crate::renderer::RendererSet;

    fn fanout(members: &[Arc<MockRenderer>]) -> MultiRenderer {
        let renderers = members
            .iter()
            .map(|member| Arc::clone(member) as Arc<dyn Renderer>)
            .collect();
        MultiRenderer::new(RendererSet::from_ordered(renderers).expect("members"))
    }

    fn managers() -> (Arc<dyn IpcManager>, Arc<dyn EventManager>) {
        (Arc::new(IpcDispatcher::new()), Arc::new(EventHub::new()))
    }

    struct PanickingRenderer;

    impl Renderer for PanickingRenderer {
        fn name(&self) -> &str {
            "panicking"
        }

        fn initialise(
            &self,
            _config: &AppConfig,
            _ipc: Arc<dyn IpcManager>,
            _events: Arc<dyn EventManager>,
        ) -> Result<(), RendererError> {
            Ok(())
        }

        fn run(&self, _cancel: &CancelToken) -> Result<(), RendererError> {
            panic!("native loop crashed");
        }

        fn new_binding(&self, _name: &str) -> Result<(), RendererError> {
            Ok(())
        }

        fn callback(&self, _data: &str) -> Result<(), RendererError> {
            Ok(())
        }

        fn notify_event(&self, _event: &EventData) -> Result<(), RendererError> {
            Ok(())
        }

        fn select_file(&self) -> Option<String> {
            None
        }

        fn select_directory(&self) -> Option<String> {
            None
        }

        fn select_save_file(&self) -> Option<String> {
            None
        }

        fn set_colour(&self, _colour: &str) -> Result<(), RendererError> {
            Ok(())
        }

        fn enable_console(&self) {}

        fn fullscreen(&self) {}

        fn unfullscreen(&self) {}

        fn set_title(&self, _title: &str) {}

        fn close(&self) {}
    }

    #[test]
    fn initialise_stops_at_the_first_failing_member() {
        let log = CallLog::new();
        let first = Arc::new(MockRenderer::new("first", log.clone()));
        let second = Arc::new(MockRenderer::new("second", log.clone()).failing_initialise("no gpu"));
        let third = Arc::new(MockRenderer::new("third", log.clone()));
        let multi = fanout(&[first.clone(), second.clone(), third.clone()]);
        let (ipc, events) = managers();

        let error = multi
            .initialise(&AppConfig::default(), ipc, events)
            .expect_err("second member fails");

        assert_eq!(Some(error), second.initialise_error());
        assert_eq!(log.renderers_for("initialise"), vec!["first", "second"]);
        assert!(first.is_initialised());
        assert!(!third.is_initialised());
    }

    #[test]
    fn initialise_hands_every_member_the_config() {
        let log = CallLog::new();
        let first = Arc::new(MockRenderer::new("first", log.clone()));
        let second = Arc::new(MockRenderer::new("second", log.clone()));
        let multi = fanout(&[first.clone(), second.clone()]);
        let (ipc, events) = managers();
        let config = AppConfig {
            title: "Configured".to_string(),
            ..AppConfig::default()
        };

        multi
            .initialise(&config, ipc, events)
            .expect("all members initialise");

        assert_eq!(first.config(), Some(config.clone()));
        assert_eq!(second.config(), Some(config));
    }

    #[test]
    fn run_keeps_primary_on_caller_thread_and_waits_for_secondaries() {
        let log = CallLog::new();
        let background = Arc::new(
            MockRenderer::new("bridge", log.clone())
                .with_run(RunScript::Sleep(Duration::from_millis(40), Ok(()))),
        );
        let primary = Arc::new(
            MockRenderer::new("window", log.clone())
                .with_run(RunScript::Sleep(Duration::from_millis(20), Ok(()))),
        );
        let multi = fanout(&[background.clone(), primary.clone()]);

        assert_eq!(multi.run(&CancelToken::new()), Ok(()));

        let caller = thread::current().id();
        let primary_run = primary.run_observation().expect("primary ran");
        let background_run = background.run_observation().expect("secondary ran");
        assert_eq!(primary_run.thread, caller);
        assert_ne!(background_run.thread, caller);
        assert!(
            background_run.finished.is_some(),
            "run must not return before the secondary completes"
        );
        assert!(
            background_run.started <= primary_run.finished.expect("primary finished"),
            "secondary work starts while the primary is still running"
        );
    }

    #[test]
    fn secondary_failure_is_returned_after_primary_succeeds() {
        let log = CallLog::new();
        let failure = RendererError::run("bridge", "socket closed");
        let background = Arc::new(
            MockRenderer::new("bridge", log.clone()).with_run(RunScript::Return(Err(failure.clone()))),
        );
        let primary = Arc::new(
            MockRenderer::new("window", log.clone())
                .with_run(RunScript::Sleep(Duration::from_millis(10), Ok(()))),
        );
        let multi = fanout(&[background, primary.clone()]);

        assert_eq!(multi.run(&CancelToken::new()), Err(failure));
        assert!(primary
            .run_observation()
            .and_then(|run| run.finished)
            .is_some());
    }

    #[test]
    fn first_failing_secondary_in_list_order_wins() {
        let log = CallLog::new();
        let slow_failure = RendererError::run("slow", "late failure");
        let fast_failure = RendererError::run("fast", "early failure");
        let slow = Arc::new(MockRenderer::new("slow", log.clone()).with_run(RunScript::Sleep(
            Duration::from_millis(20),
            Err(slow_failure.clone()),
        )));
        let fast = Arc::new(
            MockRenderer::new("fast", log.clone()).with_run(RunScript::Return(Err(fast_failure))),
        );
        let primary = Arc::new(MockRenderer::new("window", log.clone()));
        let multi = fanout(&[slow, fast, primary]);

        assert_eq!(multi.run(&CancelToken::new()), Err(slow_failure));
    }

    #[test]
    fn primary_failure_returns_without_waiting_for_secondaries() {
        let log = CallLog::new();
        let background = Arc::new(
            MockRenderer::new("bridge", log.clone()).with_run(RunScript::UntilStopped),
        );
        let failure = RendererError::run("window", "display lost");
        let primary = Arc::new(
            MockRenderer::new("window", log.clone())
                .with_run(RunScript::Return(Err(failure.clone()))),
        );
        let multi = fanout(&[background.clone(), primary]);
        let cancel = CancelToken::new();

        assert_eq!(multi.run(&cancel), Err(failure));
        assert!(background
            .run_observation()
            .map(|run| run.finished.is_none())
            .unwrap_or(true));

        cancel.cancel();
    }

    #[test]
    fn panicking_secondary_is_reported_not_propagated() {
        let primary: Arc<dyn Renderer> = Arc::new(MockRenderer::new("window", CallLog::new()));
        let multi = MultiRenderer::new(
            RendererSet::new(primary).with_secondary(Arc::new(PanickingRenderer)),
        );

        assert_eq!(
            multi.run(&CancelToken::new()),
            Err(RendererError::Panicked {
                renderer: "panicking".to_string(),
                operation: "run",
            })
        );
    }

    #[test]
    fn selections_return_the_first_non_empty_answer() {
        let log = CallLog::new();
        let multi = fanout(&[
            Arc::new(MockRenderer::new("a", log.clone()).selecting("select_file", "")),
            Arc::new(MockRenderer::new("b", log.clone()).selecting("select_file", "/a/b")),
            Arc::new(MockRenderer::new("c", log.clone()).selecting("select_file", "/c")),
        ]);

        assert_eq!(multi.select_file().as_deref(), Some("/a/b"));
        assert_eq!(log.renderers_for("select_file"), vec!["a", "b"]);
    }

    #[test]
    fn selections_are_empty_only_when_every_member_is_empty() {
        let log = CallLog::new();
        let multi = fanout(&[
            Arc::new(MockRenderer::new("a", log.clone()).selecting("select_directory", "")),
            Arc::new(MockRenderer::new("b", log.clone())),
            Arc::new(MockRenderer::new("c", log.clone()).selecting("select_save_file", "/out")),
        ]);

        assert_eq!(multi.select_directory(), None);
        assert_eq!(multi.select_save_file().as_deref(), Some("/out"));
        assert_eq!(log.renderers_for("select_directory"), vec!["a", "b", "c"]);
    }

    #[test]
    fn fallible_broadcasts_stop_at_the_first_failing_member() {
        for operation in ["new_binding", "callback", "notify_event", "set_colour"] {
            let log = CallLog::new();
            let second = Arc::new(MockRenderer::new("second", log.clone()).failing(operation, "rejected"));
            let multi = fanout(&[
                Arc::new(MockRenderer::new("first", log.clone())),
                second.clone(),
                Arc::new(MockRenderer::new("third", log.clone())),
            ]);

            let result = match operation {
                "new_binding" => multi.new_binding("counter.increment"),
                "callback" => multi.callback(r#"{"callback_id":"1"}"#),
                "notify_event" => multi.notify_event(&EventData::new("tick", json!(1))),
                _ => multi.set_colour("#000000"),
            };

            assert_eq!(result, Err(second.operation_error(operation).expect("scripted")));
            assert_eq!(
                log.renderers_for(operation),
                vec!["first", "second"],
                "{operation} must skip members after the failure"
            );
        }
    }

    #[test]
    fn void_broadcasts_reach_every_member() {
        let log = CallLog::new();
        let members = [
            Arc::new(MockRenderer::new("first", log.clone()).failing("set_colour", "broken")),
            Arc::new(MockRenderer::new("second", log.clone()).failing("notify_event", "broken")),
            Arc::new(MockRenderer::new("third", log.clone())),
        ];
        let multi = fanout(&members);

        multi.enable_console();
        multi.fullscreen();
        multi.set_title("Hello");
        multi.unfullscreen();
        multi.close();

        for operation in ["enable_console", "fullscreen", "set_title", "unfullscreen", "close"] {
            assert_eq!(log.renderers_for(operation), vec!["first", "second", "third"]);
        }
        for member in &members {
            assert!(member.console_enabled());
            assert!(!member.is_fullscreen());
            assert_eq!(member.title().as_deref(), Some("Hello"));
            assert!(member.is_closed());
        }
    }

    #[test]
    fn nested_fanouts_reach_every_leaf() {
        let log = CallLog::new();
        let inner_a = Arc::new(MockRenderer::new("inner-a", log.clone()));
        let inner_b = Arc::new(MockRenderer::new("inner-b", log.clone()));
        let inner: Arc<dyn Renderer> = Arc::new(MultiRenderer::named(
            "inner",
            RendererSet::new(inner_b.clone() as Arc<dyn Renderer>)
                .with_secondary(inner_a.clone() as Arc<dyn Renderer>),
        ));
        let outer_primary = Arc::new(MockRenderer::new("window", log.clone()));
        let outer = MultiRenderer::new(
            RendererSet::new(outer_primary.clone() as Arc<dyn Renderer>).with_secondary(inner),
        );

        outer
            .new_binding("app.greet")
            .expect("every leaf accepts the binding");

        assert_eq!(
            log.renderers_for("new_binding"),
            vec!["inner-a", "inner-b", "window"]
        );
        assert_eq!(outer.run(&CancelToken::new()), Ok(()));
        assert!(inner_a.run_observation().is_some());
        assert!(inner_b.run_observation().is_some());
    }

    #[test]
    fn supervised_run_cancels_the_primary_when_a_secondary_fails() {
        let log = CallLog::new();
        let failure = RendererError::run("bridge", "socket closed");
        let background = Arc::new(
            MockRenderer::new("bridge", log.clone()).with_run(RunScript::Sleep(
                Duration::from_millis(10),
                Err(failure.clone()),
            )),
        );
        let primary = Arc::new(
            MockRenderer::new("window", log.clone()).with_run(RunScript::UntilStopped),
        );
        let multi = fanout(&[background, primary.clone()]);
        let cancel = CancelToken::new();

        assert_eq!(
            multi.run_supervised(&cancel),
            Err(RunFailure::Background(failure))
        );
        assert!(cancel.is_cancelled());
        assert!(primary
            .run_observation()
            .and_then(|run| run.finished)
            .is_some());
    }

    #[test]
    fn supervised_run_joins_secondaries_after_primary_failure() {
        let log = CallLog::new();
        let background = Arc::new(
            MockRenderer::new("bridge", log.clone()).with_run(RunScript::UntilStopped),
        );
        let failure = RendererError::run("window", "display lost");
        let primary = Arc::new(
            MockRenderer::new("window", log.clone())
                .with_run(RunScript::Return(Err(failure.clone()))),
        );
        let multi = fanout(&[background.clone(), primary]);

        let outcome = multi.run_supervised(&CancelToken::new());

        assert_eq!(outcome.clone(), Err(RunFailure::Primary(failure.clone())));
        assert_eq!(outcome.map_err(RunFailure::into_inner), Err(failure));
        assert!(background
            .run_observation()
            .and_then(|run| run.finished)
            .is_some());
    }

    #[test]
    fn supervised_run_reports_a_panicking_secondary_as_background_failure() {
        let primary: Arc<dyn Renderer> = Arc::new(
            MockRenderer::new("window", CallLog::new()).with_run(RunScript::UntilStopped),
        );
        let multi = MultiRenderer::new(
            RendererSet::new(primary).with_secondary(Arc::new(PanickingRenderer)),
        );

        assert_eq!(
            multi.run_supervised(&CancelToken::new()),
            Err(RunFailure::Background(RendererError::Panicked {
                renderer: "panicking".to_string(),
                operation: "run",
            }))
        );
    }
}
