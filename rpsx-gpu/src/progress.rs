// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Throttled pipeline compile progress.

use std::time::{Duration, Instant};

use crate::host::HostInterface;

const SHOW_AFTER: Duration = Duration::from_secs(1);
const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Counts compiled objects and reports to the host's loading screen once
/// compilation has taken longer than a second, at most ten times a second.
pub struct CompileProgress {
    total: u32,
    progress: u32,
    start: Instant,
    last_update: Option<Instant>,
}

impl CompileProgress {
    pub fn new(total: u32) -> Self {
        Self::starting_at(total, Instant::now())
    }

    fn starting_at(total: u32, start: Instant) -> Self {
        Self {
            total,
            progress: 0,
            start,
            last_update: None,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn increment(&mut self, host: &mut dyn HostInterface) {
        self.progress += 1;
        self.report(host, Instant::now());
    }

    fn report(&mut self, host: &mut dyn HostInterface, now: Instant) {
        if now.duration_since(self.start) < SHOW_AFTER {
            return;
        }
        if let Some(last) = self.last_update {
            if now.duration_since(last) < UPDATE_INTERVAL && self.progress < self.total {
                return;
            }
        }
        self.last_update = Some(now);
        host.display_loading_screen("Compiling shaders...", 0, self.total, self.progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    #[test]
    fn test_hidden_during_first_second() {
        let mut host = RecordingHost::default();
        let mut p = CompileProgress::new(100);
        for _ in 0..10 {
            p.increment(&mut host);
        }
        assert_eq!(p.progress(), 10);
        assert!(host.progress.is_empty());
    }

    #[test]
    fn test_throttled_after_first_second() {
        let mut host = RecordingHost::default();
        let start = Instant::now();
        let mut p = CompileProgress::starting_at(100, start);
        let later = start + Duration::from_secs(2);

        p.progress = 1;
        p.report(&mut host, later);
        p.progress = 2;
        p.report(&mut host, later + Duration::from_millis(50));
        p.progress = 3;
        p.report(&mut host, later + Duration::from_millis(150));
        assert_eq!(host.progress, vec![(1, 100), (3, 100)]);
    }
}
