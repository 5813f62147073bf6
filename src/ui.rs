use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    /// `Pretty` forces the spinner on a terminal; `Auto` backs off when disabled.
    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    /// A single status line for a long-running pane. Finishes on drop.
    pub fn status(&self, title: &str) -> StatusLine {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_prefix(title.to_string());
            spinner.set_message("idle");
            StatusLine::new(title.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", title);
            StatusLine::new(title.to_string(), None)
        }
    }
}

pub struct StatusLine {
    title: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    last: String,
}

impl StatusLine {
    fn new(title: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            title,
            start: Instant::now(),
            spinner,
            last: String::new(),
        }
    }

    /// Replace the status text. Plain mode prints only when it changes.
    pub fn update(&mut self, message: impl Into<String>) {
        let message = message.into();
        if message == self.last {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.clone()),
            None => eprintln!("    {}", message),
        }
        self.last = message;
    }

    /// A line that stays in the scrollback above the status.
    pub fn note(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(format!("  {message}")),
            None => eprintln!("  {message}"),
        }
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(format!("✔ {} ({})", self.last, format_duration(elapsed)));
        } else {
            eprintln!("✔ {} ({})", self.title, format_duration(elapsed));
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
