use indicatif::{ProgressBar, ProgressStyle};

/// Frame-level progress for `predict`. The length is filled in by the first update.
pub struct PredictProgress {
    bar: ProgressBar,
}

impl PredictProgress {
    pub fn new(label: &'static str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());
        bar.set_prefix(label);
        Self { bar }
    }

    pub fn observe(&self, done: usize, total: usize) {
        let total = total as u64;
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(done as u64);
        if done as u64 == total {
            self.bar.set_message("done");
        }
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>5}/{len:<5} frames [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .map(|style| style.progress_chars("█▉▊▋▌▍▎▏ "))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}
