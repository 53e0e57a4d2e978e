//! UI helpers for the installer CLI.
//!
//! Provides consistent formatting for console output during installation.

use std::time::Duration;

use colored::Colorize;

use crate::readiness::ReadinessOutcome;

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print a progress step with step number.
pub fn print_progress_step(current: u8, total: u8, message: &str) {
    println!(
        "{} {} {}",
        format!("[{current}/{total}]").bright_black(),
        "▶".cyan(),
        message.bold()
    );
}

/// Print a skipped step.
pub fn print_skipped(message: &str) {
    println!("  {} {}", "⏭".bright_black(), message.bright_black());
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print installation progress.
pub fn print_progress(message: &str) {
    println!("  {} {}", "→".cyan(), message);
}

/// Print one readiness poll.
pub fn print_wait(
    cluster: &str,
    what: &str,
    outcome: ReadinessOutcome,
    attempt: u32,
    elapsed: Duration,
) {
    let state = match outcome {
        ReadinessOutcome::Success => "ready".green(),
        ReadinessOutcome::InProgress => "waiting".yellow(),
        ReadinessOutcome::Failed => "failing".red(),
    };
    println!(
        "  {} {cluster}: {what} {state} {}",
        "⟳".cyan(),
        format!("(check {attempt}, {}s elapsed)", elapsed.as_secs()).bright_black()
    );
}

/// Print prerequisite check result.
pub fn print_check_result(name: &str, passed: bool, message: Option<&str>) {
    let status = if passed { "✓".green() } else { "✗".red() };

    let text = if let Some(msg) = message {
        format!("{name} - {msg}")
    } else {
        name.to_string()
    };

    println!("  {status} {text}");
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a shell command the operator can run next.
pub fn print_command(command: &str) {
    println!("    {}", command.cyan());
}
