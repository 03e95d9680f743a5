use console::{Style, style};

use crate::pipeline::{OutcomeStatus, StageStatus};

pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Suppress everything except errors and the final status line
    pub fn quiet(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    pub fn header(&self, message: &str) {
        if !self.quiet {
            println!("\n{}", style(message).bold().underlined());
        }
    }

    pub fn section(&self, message: &str) {
        if !self.quiet {
            println!("\n{}", style(message).bold());
            println!("{}", "─".repeat(40));
        }
    }

    /// Aligned `key: value` line
    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        if !self.quiet {
            println!("  {:<18} {}", style(format!("{key}:")).dim(), value);
        }
    }

    pub fn item(&self, text: &str) {
        if !self.quiet {
            println!("  • {text}");
        }
    }

    /// One row of the per-stage breakdown
    pub fn stage(&self, name: &str, status: StageStatus, detail: &str) {
        if self.quiet {
            return;
        }
        let styled = stage_style(status).apply_to(format!("{:<9}", status.as_str()));
        if detail.is_empty() {
            println!("  {name:<10} {styled}");
        } else {
            println!("  {name:<10} {styled} {}", style(detail).dim());
        }
    }

    /// Final status line; always printed
    pub fn outcome(&self, status: OutcomeStatus, summary: &str) {
        match status {
            OutcomeStatus::Completed => self.success(&format!("Completed: {summary}")),
            OutcomeStatus::Partial => println!(
                "{} {}",
                style("⚠").yellow(),
                style(format!("Partial: {summary}")).yellow()
            ),
            OutcomeStatus::Failed => self.error(&format!("Failed: {summary}")),
            OutcomeStatus::Cancelled => self.error(&format!("Cancelled: {summary}")),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_style(status: StageStatus) -> Style {
    match status {
        StageStatus::Succeeded => Style::new().green(),
        StageStatus::Failed => Style::new().red(),
        StageStatus::Cancelled => Style::new().red().dim(),
        StageStatus::Skipped => Style::new().cyan(),
        StageStatus::Running => Style::new().yellow(),
        StageStatus::Pending => Style::new().dim(),
    }
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `1.2s`, `350ms`
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(350), "350ms");
        assert_eq!(format_duration_ms(12_500), "12.5s");
    }
}
