// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! User-facing notification channel.
//!
//! The engine reports configuration fallbacks and pipeline compile progress
//! through a [`HostInterface`]. The default implementation forwards
//! everything to the log.

/// How long configuration notices stay on screen, in seconds.
pub const OSD_WARNING_DURATION: f32 = 10.0;
pub const OSD_INFO_DURATION: f32 = 5.0;

pub trait HostInterface: Send {
    /// Show (or replace, by `key`) a transient on-screen message.
    fn add_osd_message(&mut self, key: &str, message: &str, duration: f32) {
        log::info!("OSD [{}] ({:.0}s): {}", key, duration, message);
    }

    fn remove_osd_message(&mut self, key: &str) {
        log::debug!("OSD [{}] removed", key);
    }

    /// Loading-screen progress: `value` out of `max`.
    fn display_loading_screen(&mut self, message: &str, min: u32, max: u32, value: u32) {
        log::info!("{} {}/{}", message, value.saturating_sub(min), max.saturating_sub(min));
    }
}

/// Host that only logs.
#[derive(Debug, Default)]
pub struct LogHost;

impl HostInterface for LogHost {}

/// Host that records messages, for tests and headless runs that want to
/// inspect what would have been shown.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub messages: Vec<(String, String)>,
    pub progress: Vec<(u32, u32)>,
}

impl HostInterface for RecordingHost {
    fn add_osd_message(&mut self, key: &str, message: &str, _duration: f32) {
        log::info!("OSD [{}]: {}", key, message);
        self.messages.push((key.to_string(), message.to_string()));
    }

    fn remove_osd_message(&mut self, key: &str) {
        self.messages.retain(|(k, _)| k != key);
    }

    fn display_loading_screen(&mut self, _message: &str, _min: u32, max: u32, value: u32) {
        self.progress.push((value, max));
    }
}

impl<T: HostInterface + ?Sized> HostInterface for Box<T> {
    fn add_osd_message(&mut self, key: &str, message: &str, duration: f32) {
        (**self).add_osd_message(key, message, duration)
    }

    fn remove_osd_message(&mut self, key: &str) {
        (**self).remove_osd_message(key)
    }

    fn display_loading_screen(&mut self, message: &str, min: u32, max: u32, value: u32) {
        (**self).display_loading_screen(message, min, max, value)
    }
}
