use ksail_container::mock::FakeDocker;
use ksail_container::{StaticInvoker, WaitConfig};
use ksail_core::Notifier;
use ksail_mirror::{MirrorPipeline, RegistryCleanup};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Title,
    Activity,
    Success,
    Warning,
    Error,
}

/// 通知を記録する
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingNotifier {
    fn push(&self, level: Level, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }

    #[allow(dead_code)]
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn title(&self, message: &str) {
        self.push(Level::Title, message);
    }
    fn activity(&self, message: &str) {
        self.push(Level::Activity, message);
    }
    fn success(&self, message: &str) {
        self.push(Level::Success, message);
    }
    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }
    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}

pub fn fast_wait() -> WaitConfig {
    WaitConfig {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        multiplier: 2.0,
        deadline: None,
    }
}

#[allow(dead_code)]
pub fn pipeline(docker: &FakeDocker) -> MirrorPipeline {
    MirrorPipeline::new(
        Arc::new(StaticInvoker::new(Arc::new(docker.clone()))),
        Arc::new(docker.probe()),
        Arc::new(RecordingNotifier::default()),
    )
    .with_wait_config(fast_wait())
}

#[allow(dead_code)]
pub fn cleanup(docker: &FakeDocker, notifier: Arc<RecordingNotifier>) -> RegistryCleanup {
    RegistryCleanup::new(
        Arc::new(StaticInvoker::new(Arc::new(docker.clone()))),
        Arc::new(docker.probe()),
        notifier,
    )
}

/// `first` が `second` より先に記録されているか
#[allow(dead_code)]
pub fn happened_before(docker: &FakeDocker, first: &str, second: &str) -> bool {
    match (docker.position(first), docker.position(second)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}
