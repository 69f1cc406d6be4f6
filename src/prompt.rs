use colored::Colorize;
use std::io::{self, BufRead, Write};

/// Where the pipeline asks for confirmation and reports its outcome.
pub trait Prompt {
    /// Ask a yes/no question; `false` declines.
    fn confirm(&mut self, title: &str, message: &str) -> bool;
    fn info(&mut self, title: &str, message: &str);
    fn error(&mut self, title: &str, message: &str);
}

/// Prompt on the controlling terminal.
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        TerminalPrompt { assume_yes }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&mut self, title: &str, message: &str) -> bool {
        println!("{}\n{}", title.bold(), message);
        if self.assume_yes {
            return true;
        }
        print!("[y/N] ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn info(&mut self, title: &str, message: &str) {
        println!("{}\n{}", title.green().bold(), message);
    }

    fn error(&mut self, title: &str, message: &str) {
        eprintln!("{} {}", format!("{}:", title).red().bold(), message);
    }
}
