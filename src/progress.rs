//! TTY-gated progress reporting for archive rewrites.

use std::io::{IsTerminal, stderr};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const ENTRY_BAR_TEMPLATE: &str =
    "{prefix} [{bar:40}] {pos:>4}/{len:<4} | {elapsed_precise} | {msg}";

/// One bar per archive, advanced as recompressed entries are written out.
/// Hidden when stderr is not a terminal so logs stay clean in pipes.
pub struct RewriteProgress {
    bar: ProgressBar,
}

impl RewriteProgress {
    pub fn new(label: &str) -> Self {
        let bar = if stderr().is_terminal() {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template(ENTRY_BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix(label.to_string());
        Self { bar }
    }

    /// Entry count becomes known once the local header pass is complete.
    pub fn begin_entries(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    pub fn entry_finished(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
