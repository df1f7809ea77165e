//! Log sink that renders the session log on stderr.

use {
    console::{Term, style},
    ideaflash::LogSink,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    std::{
        sync::{Mutex, MutexGuard},
        time::Duration,
    },
};

#[derive(Default)]
struct Progress {
    bar: Option<ProgressBar>,
    last: Option<String>,
}

/// Terminal rendition of the status log.
///
/// The progress line is an `indicatif` spinner when stderr is a terminal.
/// Otherwise only its final text is printed once the progress ends.
pub struct TerminalLog {
    fancy: bool,
    quiet: bool,
    progress: Mutex<Progress>,
}

impl TerminalLog {
    /// Create a sink; `quiet` hides everything but errors.
    pub fn new(fancy: bool, quiet: bool) -> Self {
        Self {
            fancy,
            quiet,
            progress: Mutex::new(Progress::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn print(progress: &Progress, line: &str) {
        match &progress.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl LogSink for TerminalLog {
    fn write_line(&self, text: &str) {
        if self.quiet {
            return;
        }
        let progress = self.lock();
        Self::print(&progress, text);
    }

    fn error(&self, text: &str) {
        let progress = self.lock();
        Self::print(
            &progress,
            &format!("{} {text}", style("Error:").red().bold()),
        );
    }

    fn update_progress(&self, text: &str) {
        if self.quiet {
            return;
        }
        let mut progress = self.lock();
        if self.fancy {
            progress
                .bar
                .get_or_insert_with(Self::spinner)
                .set_message(text.to_string());
        }
        progress.last = Some(text.to_string());
    }

    fn end_progress(&self) {
        let mut progress = self.lock();
        let last = progress
            .last
            .take();
        match progress
            .bar
            .take()
        {
            Some(bar) => bar.finish(),
            None => {
                if let Some(text) = last {
                    eprintln!("{text}");
                }
            },
        }
    }

    fn clean(&self) {
        self.end_progress();
        if self.fancy {
            let _ = Term::stderr().clear_screen();
        }
    }
}
