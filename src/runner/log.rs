// src/runner/log.rs

//! Log line prefixes and run-time formatting.

use std::time::Duration;

pub const TASK_START_PREFIX: &str = " >>>  ";
pub const TASK_END_PREFIX: &str = " <<<  ";
pub const INDENT: &str = "      ";
pub const CMD_PREFIX: &str = "[CMD] ";
pub const SSH_PREFIX: &str = "[SSH] ";
pub const OUTPUT_PREFIX: &str = "> ";

pub(crate) const CLI_BLANK_LINES: usize = 15;
pub(crate) const CLI_RULE_WIDTH: usize = 36;

/// Human-readable elapsed time: `123.4ms` below 1.5s, `m:ss` above.
pub fn pretty_run_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 1.5 {
        let ms = (secs * 10_000.0).round() / 10.0;
        format!("{ms:.1}ms")
    } else {
        let total = secs.round() as u64;
        format!("{}:{:02}s", total / 60, total % 60)
    }
}

pub(crate) fn rule(ch: char) -> String {
    std::iter::repeat_n(ch, CLI_RULE_WIDTH).collect()
}
