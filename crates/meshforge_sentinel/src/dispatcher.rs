//! The watch dispatch loop.
//!
//! Consumes watch events one at a time in arrival order, completes pairs and
//! dispatches jobs. A dispatch runs to completion (success or failure) before
//! the next event is matched, so at most one worker subprocess is ever
//! outstanding. A stop signal lets any in-flight job finish, then exits.

use crate::event::{EventError, EventSource, WatchEvent};
use meshforge_core::{ForgeError, Invoke, Job, PairMatcher, WatchConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to block on the event source between stop-signal checks.
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Dispatcher lifecycle. `Idle` until the watch roots are confirmed and the
/// loop starts; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Observing,
    Matching,
    Dispatching,
    Stopped,
}

/// Long-running loop translating filesystem activity into dispatched jobs.
#[derive(Debug)]
pub struct WatchDispatcher<I: Invoke> {
    matcher: PairMatcher,
    invoker: I,
    extra_flags: Vec<String>,
    /// Concrete (model, reference) path pairs already dispatched. Repeated
    /// notifications for an already-paired file never re-trigger a job.
    dispatched: HashSet<(PathBuf, PathBuf)>,
    state: DispatcherState,
}

impl<I: Invoke> WatchDispatcher<I> {
    /// Validates the watch roots; a missing root is fatal at startup.
    pub fn new(config: &WatchConfig, invoker: I) -> Result<Self, ForgeError> {
        config.validate()?;
        Ok(Self {
            matcher: PairMatcher::new(config),
            invoker,
            extra_flags: config.extra_flags.clone(),
            dispatched: HashSet::new(),
            state: DispatcherState::Idle,
        })
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Run until the event source closes.
    pub fn run<S: EventSource>(&mut self, source: S) -> Result<(), ForgeError> {
        self.run_inner(source, None)
    }

    /// Run until the event source closes or the stop channel fires. Any
    /// in-flight job finishes before the dispatcher exits.
    pub fn run_with_shutdown<S: EventSource>(
        &mut self,
        source: S,
        stop_rx: mpsc::Receiver<()>,
    ) -> Result<(), ForgeError> {
        self.run_inner(source, Some(stop_rx))
    }

    fn run_inner<S: EventSource>(
        &mut self,
        mut source: S,
        stop_rx: Option<mpsc::Receiver<()>>,
    ) -> Result<(), ForgeError> {
        self.state = DispatcherState::Observing;
        info!("Watch dispatcher observing");

        loop {
            if let Some(rx) = stop_rx.as_ref() {
                match rx.try_recv() {
                    Ok(()) => {
                        info!("Watch dispatcher received stop signal");
                        break;
                    }
                    Err(mpsc::TryRecvError::Disconnected) => {
                        info!("Watch dispatcher stop channel closed");
                        break;
                    }
                    Err(mpsc::TryRecvError::Empty) => {}
                }
            }

            match source.next_event(POLL_TIMEOUT) {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => {}
                Err(EventError::Closed) => {
                    info!("Event source closed");
                    break;
                }
                Err(err) => {
                    warn!(%err, "Notification error, watching resumes");
                }
            }
        }

        self.state = DispatcherState::Stopped;
        Ok(())
    }

    fn handle_event(&mut self, event: WatchEvent) {
        self.state = DispatcherState::Matching;
        debug!(path = %event.path.display(), kind = ?event.kind, "Matching event");

        let Some(pair) = self.matcher.match_event(&event.path) else {
            debug!(path = %event.path.display(), "Pair incomplete, event recorded");
            self.state = DispatcherState::Observing;
            return;
        };

        let key = (pair.model_path.clone(), pair.reference_path.clone());
        if !self.dispatched.insert(key) {
            debug!(
                model = %pair.model_path.display(),
                "Pair already dispatched, duplicate notification ignored"
            );
            self.state = DispatcherState::Observing;
            return;
        }

        self.state = DispatcherState::Dispatching;
        info!(
            model = %pair.model_path.display(),
            reference = %pair.reference_path.display(),
            "Pair complete, dispatching"
        );

        let job = Job::process(pair.model_path, pair.reference_path, pair.output_dir)
            .with_flags(&self.extra_flags);
        match self.invoker.invoke(&job) {
            Ok(result) if result.succeeded => {
                info!(
                    artifacts = result.output_files.len(),
                    duration_ms = result.duration_ms,
                    "Job succeeded"
                );
            }
            Ok(result) => {
                warn!(exit_code = result.exit_code, "Job failed");
            }
            Err(err) => {
                warn!(%err, "Job failed to start");
            }
        }

        self.state = DispatcherState::Observing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WatchEventKind;
    use chrono::Utc;
    use meshforge_core::{JobError, JobResult};
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    /// Replays a fixed script of events, then closes.
    struct ScriptedSource {
        events: VecDeque<WatchEvent>,
    }

    impl ScriptedSource {
        fn new(events: Vec<WatchEvent>) -> Self {
            Self {
                events: events.into(),
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn next_event(&mut self, _timeout: Duration) -> Result<Option<WatchEvent>, EventError> {
            match self.events.pop_front() {
                Some(event) => Ok(Some(event)),
                None => Err(EventError::Closed),
            }
        }
    }

    /// Never yields an event; used for shutdown tests.
    struct IdleSource;

    impl EventSource for IdleSource {
        fn next_event(&mut self, _timeout: Duration) -> Result<Option<WatchEvent>, EventError> {
            Ok(None)
        }
    }

    #[derive(Debug, Default)]
    struct RecordingInvoker {
        jobs: Vec<Job>,
        exit_nonzero: Vec<usize>,
    }

    impl Invoke for RecordingInvoker {
        fn invoke(&mut self, job: &Job) -> Result<JobResult, JobError> {
            let index = self.jobs.len();
            self.jobs.push(job.clone());
            let exit_code = if self.exit_nonzero.contains(&index) { 1 } else { 0 };
            Ok(JobResult {
                job: job.clone(),
                exit_code,
                succeeded: exit_code == 0,
                output_files: Vec::new(),
                duration_ms: 1,
                finished_at: Utc::now(),
            })
        }
    }

    fn watch_setup(tmp: &TempDir) -> WatchConfig {
        // Resolve the temp root so path assertions compare exact values.
        let root = tmp.path().canonicalize().unwrap();
        let models = root.join("models");
        let refs = root.join("refs");
        fs::create_dir_all(&models).unwrap();
        fs::create_dir_all(&refs).unwrap();
        WatchConfig::new(models, refs, root.join("out"))
    }

    fn created(path: PathBuf) -> WatchEvent {
        WatchEvent {
            path,
            kind: WatchEventKind::Created,
        }
    }

    #[test]
    fn complete_pair_dispatches_exactly_one_job() {
        let tmp = TempDir::new().unwrap();
        let config = watch_setup(&tmp);
        fs::write(config.models_dir.join("sword.fbx"), b"").unwrap();
        fs::write(config.references_dir.join("sword.png"), b"").unwrap();

        let mut dispatcher = WatchDispatcher::new(&config, RecordingInvoker::default()).unwrap();
        let source = ScriptedSource::new(vec![created(config.models_dir.join("sword.fbx"))]);
        dispatcher.run(source).unwrap();

        assert_eq!(dispatcher.invoker.jobs.len(), 1);
        let job = &dispatcher.invoker.jobs[0];
        assert_eq!(job.model_path, Some(config.models_dir.join("sword.fbx")));
        assert_eq!(job.reference_path, Some(config.references_dir.join("sword.png")));
        assert_eq!(job.output_dir, config.output_dir.join("sword"));
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[test]
    fn duplicate_notifications_do_not_redispatch() {
        let tmp = TempDir::new().unwrap();
        let config = watch_setup(&tmp);
        fs::write(config.models_dir.join("sword.fbx"), b"").unwrap();
        fs::write(config.references_dir.join("sword.png"), b"").unwrap();

        let mut dispatcher = WatchDispatcher::new(&config, RecordingInvoker::default()).unwrap();
        let source = ScriptedSource::new(vec![
            created(config.models_dir.join("sword.fbx")),
            created(config.models_dir.join("sword.fbx")),
            created(config.references_dir.join("sword.png")),
        ]);
        dispatcher.run(source).unwrap();

        assert_eq!(dispatcher.invoker.jobs.len(), 1);
    }

    #[test]
    fn incomplete_pair_dispatches_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = watch_setup(&tmp);
        fs::write(config.models_dir.join("sword.fbx"), b"").unwrap();

        let mut dispatcher = WatchDispatcher::new(&config, RecordingInvoker::default()).unwrap();
        let source = ScriptedSource::new(vec![created(config.models_dir.join("sword.fbx"))]);
        dispatcher.run(source).unwrap();

        assert!(dispatcher.invoker.jobs.is_empty());
    }

    #[test]
    fn job_failure_does_not_stop_the_loop() {
        let tmp = TempDir::new().unwrap();
        let config = watch_setup(&tmp);
        for stem in ["sword", "shield"] {
            fs::write(config.models_dir.join(format!("{stem}.fbx")), b"").unwrap();
            fs::write(config.references_dir.join(format!("{stem}.png")), b"").unwrap();
        }

        let invoker = RecordingInvoker {
            exit_nonzero: vec![0],
            ..Default::default()
        };
        let mut dispatcher = WatchDispatcher::new(&config, invoker).unwrap();
        let source = ScriptedSource::new(vec![
            created(config.models_dir.join("sword.fbx")),
            created(config.models_dir.join("shield.fbx")),
        ]);
        dispatcher.run(source).unwrap();

        assert_eq!(dispatcher.invoker.jobs.len(), 2);
        let stems: Vec<_> = dispatcher
            .invoker
            .jobs
            .iter()
            .map(|j| j.model_path.clone().unwrap())
            .collect();
        assert_eq!(
            stems,
            vec![
                config.models_dir.join("sword.fbx"),
                config.models_dir.join("shield.fbx"),
            ]
        );
    }

    #[test]
    fn stop_signal_ends_observation() {
        let tmp = TempDir::new().unwrap();
        let config = watch_setup(&tmp);

        let mut dispatcher = WatchDispatcher::new(&config, RecordingInvoker::default()).unwrap();
        let (stop_tx, stop_rx) = mpsc::channel();
        stop_tx.send(()).unwrap();
        dispatcher.run_with_shutdown(IdleSource, stop_rx).unwrap();

        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert!(dispatcher.invoker.jobs.is_empty());
    }

    #[test]
    fn missing_watch_root_is_fatal_at_startup() {
        let tmp = TempDir::new().unwrap();
        let config = WatchConfig::new(
            tmp.path().join("absent"),
            tmp.path().to_path_buf(),
            tmp.path().join("out"),
        );
        let err = WatchDispatcher::new(&config, RecordingInvoker::default()).unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)));
    }
}
