use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner style used during ongoing operations.
/// - Yellow spinner with animated braille-style frames.
/// - Displays the current message (`{wide_msg}`) next to the spinner.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap()
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Determinate bar for downloads of known length.
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "\x1b[33m{spinner}\x1b[0m {msg} [{bar:40}] {percent}% ({bytes}/{total_bytes})",
    )
    .unwrap()
    .progress_chars("=> ")
}

/// Style used when an operation finishes successfully.
/// - Green check mark followed by the final message.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg}").unwrap()
}

/// Style used when an operation fails with an error.
/// - Red cross followed by the error message.
pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[31m✘\x1b[0m {wide_msg}").unwrap()
}

/// Renders `(downloaded, total)` updates.
///
/// A `total` of `0` means the length is unknown, in which case the bar
/// falls back to a spinner showing the byte count so far.
pub struct DownloadProgress {
    pb: ProgressBar,
    determinate: bool,
}

impl DownloadProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("downloading");
        DownloadProgress {
            pb,
            determinate: false,
        }
    }

    pub fn update(&mut self, downloaded: u64, total: u64) {
        if total > 0 {
            if !self.determinate {
                self.pb.set_style(bar_style());
                self.pb.set_message("downloading");
                self.determinate = true;
            }
            self.pb.set_length(total);
            self.pb.set_position(downloaded);
            if downloaded >= total {
                self.finish_ok(format!("downloaded {} KB", total / 1024));
            }
        } else {
            if self.determinate {
                self.pb.set_style(spinner_style());
                self.determinate = false;
            }
            self.pb.set_message(format!("downloading: {} KB", downloaded / 1024));
        }
    }

    pub fn finish_ok(&self, msg: impl Into<String>) {
        self.pb.set_style(ok_style());
        self.pb.finish_with_message(msg.into());
    }

    pub fn is_finished(&self) -> bool {
        self.pb.is_finished()
    }

    pub fn finish_err(&self, msg: impl Into<String>) {
        self.pb.set_style(err_style());
        self.pb.finish_with_message(msg.into());
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}
