use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}";

/// Stage progress bar; draws nothing when stderr is not a terminal.
pub fn stage_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(message);
    bar
}
