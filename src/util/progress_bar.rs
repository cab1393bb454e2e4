
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use log::info;

/// Number of records between progress log messages
pub const PROGRESS_MILESTONE: u64 = 1_000_000;

/// Shared function to pull our progress bar styling
pub fn get_progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}); ETA: {eta_precise}; Speed: {per_sec} {msg}")
        .unwrap()
        .with_key("percent", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.1}%", state.fraction()*100.0).unwrap())
        .with_key("per_sec", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.0}/s", state.per_sec()).unwrap())
        .progress_chars("##-")
}

/// Spinner styling for streams of unknown length
pub fn get_spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {spinner} {pos} {msg}; Speed: {per_sec}")
        .unwrap()
        .with_key("per_sec", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.0}/s", state.per_sec()).unwrap())
}

/// Progress for a single streaming pass: drives a spinner and logs every `PROGRESS_MILESTONE` records
pub struct RecordProgress {
    /// What is being counted, e.g. "variant calls"
    label: String,
    count: u64,
    spinner: ProgressBar
}

impl RecordProgress {
    /// Constructor
    pub fn new(label: &str) -> Self {
        let spinner = ProgressBar::new_spinner()
            .with_style(get_spinner_style())
            .with_message(label.to_string());
        Self {
            label: label.to_string(),
            count: 0,
            spinner
        }
    }

    /// Counts one record
    pub fn tick(&mut self) {
        self.count += 1;
        self.spinner.inc(1);
        if self.count % PROGRESS_MILESTONE == 0 {
            info!("Processed {} {}...", self.count, self.label);
        }
    }

    /// Clears the spinner and returns the final count
    pub fn finish(self) -> u64 {
        self.spinner.finish_and_clear();
        info!("Finished processing {} {}.", self.count, self.label);
        self.count
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
