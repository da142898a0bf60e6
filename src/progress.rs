/// Sink for human-readable status updates of long-running commands.
pub trait Progress: Sync {
    fn update(&self, text: &str);
}

/// Reports nothing.
impl Progress for () {
    fn update(&self, _text: &str) {}
}

/// Reports through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn update(&self, text: &str) {
        tracing::info!("{text}");
    }
}
