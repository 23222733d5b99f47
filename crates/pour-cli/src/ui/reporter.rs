//! Line-oriented terminal reporter.

use std::io::{Stderr, Write, stderr};
use std::sync::Mutex;

use crossterm::QueueableCommand;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use pour_core::Reporter;
use pour_schema::{PackageName, Version};

use super::theme::Theme;

/// Writes progress to stderr so stdout stays clean for command output.
#[derive(Debug)]
pub struct ConsoleReporter {
    theme: Theme,
    quiet: bool,
    out: Mutex<Stderr>,
    last_percent: Mutex<Option<u64>>,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
            out: Mutex::new(stderr()),
            last_percent: Mutex::new(None),
        }
    }

    fn line(&self, parts: &[(&str, Color)]) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        for (text, color) in parts {
            let _ = out.queue(SetForegroundColor(*color));
            let _ = out.queue(Print(text));
        }
        let _ = out.queue(ResetColor);
        let _ = out.queue(Print("\n"));
        let _ = out.flush();
    }

    fn package_line(&self, icon: &str, color: Color, name: &PackageName, version: &Version, detail: &str) {
        let c = &self.theme.colors;
        self.line(&[
            (format!("{icon} ").as_str(), color),
            (name.as_str(), c.package_name),
            (" ", c.secondary),
            (version.as_str(), c.version),
            (format!("  {detail}").as_str(), c.secondary),
        ]);
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            self.line(&[(format!("\n{title}").as_str(), self.theme.colors.header)]);
        }
    }

    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        if self.quiet {
            return;
        }
        // One line per 25% step; a byte-by-byte redraw is noise in a log.
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let percent = (current * 100 / total).min(100) / 25 * 25;
        let Ok(mut last) = self.last_percent.lock() else {
            return;
        };
        if *last == Some(percent) {
            return;
        }
        *last = Some(percent);
        drop(last);
        self.package_line(
            self.theme.icons.active,
            self.theme.colors.active,
            name,
            version,
            &format!("fetching {percent}%"),
        );
    }

    fn step(&self, name: &PackageName, version: &Version, step: &str) {
        if !self.quiet {
            self.package_line(self.theme.icons.active, self.theme.colors.active, name, version, step);
        }
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str, _size: Option<u64>) {
        self.package_line(self.theme.icons.success, self.theme.colors.success, name, version, detail);
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        self.package_line(self.theme.icons.error, self.theme.colors.error, name, version, reason);
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            self.line(&[
                (format!("{} ", self.theme.icons.info).as_str(), self.theme.colors.secondary),
                (msg, self.theme.colors.secondary),
            ]);
        }
    }

    fn success(&self, msg: &str) {
        if !self.quiet {
            self.line(&[
                (format!("{} ", self.theme.icons.success).as_str(), self.theme.colors.success),
                (msg, Color::Reset),
            ]);
        }
    }

    fn warning(&self, msg: &str) {
        self.line(&[
            (format!("{} ", self.theme.icons.warning).as_str(), self.theme.colors.warning),
            (msg, self.theme.colors.warning),
        ]);
    }

    fn error(&self, msg: &str) {
        self.line(&[
            (format!("{} ", self.theme.icons.error).as_str(), self.theme.colors.error),
            (msg, self.theme.colors.error),
        ]);
    }
}
