//! Progress display for parallel builds
//!
//! Per-target progress bars on top of a main bar, using indicatif.
//! Cloneable so build tasks can update their own target's bar; lines
//! written through a bar are serialized, never interleaved mid-line.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress manager for parallel target builds
#[derive(Clone)]
pub struct BuildProgress {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<String, ProgressBar>>>,
    completed: Arc<AtomicUsize>,
    total: usize,
    main_bar: ProgressBar,
}

impl BuildProgress {
    /// Create a progress manager for `total` targets
    pub fn new(total: usize) -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new(total as u64));
        main_bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} targets ({eta})",
                )
                .expect("Invalid progress template")
                .progress_chars("#>-"),
        );
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(AtomicUsize::new(0)),
            total,
            main_bar,
        }
    }

    /// Start building a target with `units` translation units to compile
    pub fn start_target(&self, name: &str, units: usize) {
        let bar = self.multi.add(ProgressBar::new(units as u64));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.yellow} {msg} [{bar:20.yellow}] {pos}/{len}")
                .expect("Invalid bar template"),
        );
        bar.set_message(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        self.bars
            .lock()
            .expect("progress lock poisoned")
            .insert(name.to_string(), bar);
    }

    /// Record one compiled unit of a target
    pub fn unit_done(&self, name: &str) {
        if let Some(bar) = self.bars.lock().expect("progress lock poisoned").get(name) {
            bar.inc(1);
        }
    }

    /// Update the message shown for a target (e.g. the current file)
    pub fn update_target(&self, name: &str, message: &str) {
        if let Some(bar) = self.bars.lock().expect("progress lock poisoned").get(name) {
            bar.set_message(format!("{}: {}", name, message));
        }
    }

    /// Mark a target as completed successfully
    pub fn finish_target(&self, name: &str) {
        if let Some(bar) = self.bars.lock().expect("progress lock poisoned").remove(name) {
            bar.finish_and_clear();
        }
        self.advance();
    }

    /// Mark a target as up to date (no bar was created)
    pub fn skip_target(&self, _name: &str) {
        self.advance();
    }

    /// Mark a target as failed, leaving the reason on screen
    pub fn fail_target(&self, name: &str, error: &str) {
        if let Some(bar) = self.bars.lock().expect("progress lock poisoned").remove(name) {
            bar.abandon_with_message(format!("{}: FAILED - {}", name, error));
        }
        self.advance();
    }

    fn advance(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.main_bar.set_position(done as u64);
    }

    /// Finish the main bar and clear any bar left behind by an abort
    pub fn finish(&self) {
        for (_, bar) in self.bars.lock().expect("progress lock poisoned").drain() {
            bar.finish_and_clear();
        }
        self.main_bar.finish_with_message(format!(
            "Processed {}/{} targets",
            self.completed.load(Ordering::Relaxed),
            self.total
        ));
    }
}
