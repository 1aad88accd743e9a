use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use console::style;
use exporter_core::{Msg, PageStage};
use exporter_engine::ProgressSink;

/// One stderr line per finished page: `[done/total] outcome`.
pub(crate) struct ConsoleProgress {
    quiet: bool,
    total: AtomicUsize,
    finished: AtomicUsize,
    current_title: Mutex<Option<String>>,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            total: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            current_title: Mutex::new(None),
        }
    }

    fn counter(&self) -> String {
        let done = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        format!("[{done}/{}]", self.total.load(Ordering::Relaxed))
    }

    fn title(&self) -> String {
        self.current_title
            .lock()
            .ok()
            .and_then(|title| title.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, msg: &Msg) {
        match msg {
            Msg::Listed { total } => {
                self.total.store(*total, Ordering::Relaxed);
                if !self.quiet {
                    eprintln!("{} pages to export", style(total).bold());
                }
            }
            Msg::PageStarted { title, .. } => {
                if let Ok(mut current) = self.current_title.lock() {
                    *current = Some(title.clone());
                }
            }
            Msg::PageWritten { file, .. } => {
                let counter = self.counter();
                if !self.quiet {
                    eprintln!("{} {} {}", style(counter).dim(), style("ok").green(), file);
                }
            }
            Msg::PageFailed { stage, reason, .. } => {
                let counter = self.counter();
                let label = match stage {
                    PageStage::FetchFailed => "fetch failed",
                    PageStage::ConvertFailed => "conversion failed",
                    _ => "write failed",
                };
                eprintln!(
                    "{} {} {:?}: {}",
                    style(counter).dim(),
                    style(label).red(),
                    self.title(),
                    reason
                );
            }
            Msg::ListingInterrupted { reason } => {
                eprintln!(
                    "{} {}",
                    style("page listing incomplete:").yellow(),
                    reason
                );
            }
            Msg::StageChanged { .. } | Msg::Warning { .. } => {}
        }
    }
}
