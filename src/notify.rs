//! # Notifications
//!
//! The engine never renders anything itself; user-facing feedback leaves
//! through a [`NotificationDispatcher`]. Authorization denials, rate-limit
//! refusals, action success/failure messages, and bulk-action summaries
//! all become [`Notification`] values handed to the dispatcher.
//!
//! Templates use `:placeholder` substitution so bulk summaries can splice
//! counts into configured message bodies.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// How prominently a notification should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// An operation completed.
    Success,
    /// Neutral information.
    Info,
    /// Something needs attention but nothing failed.
    Warning,
    /// An operation failed or was refused.
    Danger,
}

/// A user-facing notification: title, optional body, severity, and whether
/// it should persist until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// The headline text.
    pub title: String,
    /// Optional longer body text.
    pub body: Option<String>,
    /// Rendering severity.
    pub severity: Severity,
    /// Persistent notifications stay until dismissed.
    pub persistent: bool,
}

impl Notification {
    /// Creates an informational notification.
    pub fn new(title: impl Into<String>) -> Self {
        Notification {
            title: title.into(),
            body: None,
            severity: Severity::Info,
            persistent: false,
        }
    }

    /// Creates a success notification.
    pub fn success(title: impl Into<String>) -> Self {
        Self::new(title).severity(Severity::Success)
    }

    /// Creates a danger notification.
    pub fn danger(title: impl Into<String>) -> Self {
        Self::new(title).severity(Severity::Danger)
    }

    /// Sets the body text.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Marks the notification persistent.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Substitutes `:name` placeholders in a template with provided values.
///
/// Longer placeholder names are substituted first so `:count` never
/// clobbers part of `:countTotal`.
pub fn render_template(template: &str, values: &HashMap<&str, String>) -> String {
    let mut keys: Vec<&&str> = values.keys().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
    let mut rendered = template.to_string();
    for key in keys {
        rendered = rendered.replace(&format!(":{}", key), &values[*key]);
    }
    rendered
}

/// Where notifications go. The daemon installs a real sink; tests install
/// a recording one.
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers a notification to the end user.
    fn dispatch(&self, notification: Notification);
}

/// A dispatcher that remembers everything it was asked to deliver.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    /// Creates an empty recording dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications dispatched so far, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Drops all recorded notifications.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// A dispatcher that discards everything.
pub struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn dispatch(&self, _: Notification) {}
}

/// A dispatcher that appends each notification as a JSON line.
///
/// Write failures are swallowed; losing a notification must never fail
/// the action that produced it.
pub struct JsonlNotificationLog {
    path: std::path::PathBuf,
}

impl JsonlNotificationLog {
    /// Creates a log appending to the given path.
    pub fn new(path: std::path::PathBuf) -> Self {
        JsonlNotificationLog { path }
    }

    /// Reads back every notification logged so far.
    pub fn read_notifications(&self) -> Result<Vec<Notification>, std::io::Error> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let mut notifications = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let notification = serde_json::from_str(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            notifications.push(notification);
        }
        Ok(notifications)
    }
}

impl NotificationDispatcher for JsonlNotificationLog {
    fn dispatch(&self, notification: Notification) {
        use std::io::Write;
        let Ok(serialized) = serde_json::to_string(&notification) else {
            return;
        };
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = writeln!(file, "{}", serialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let notification = Notification::danger("Denied")
            .body("You cannot do that.")
            .persistent();
        assert_eq!(notification.severity, Severity::Danger);
        assert_eq!(notification.body.as_deref(), Some("You cannot do that."));
        assert!(notification.persistent);
    }

    #[test]
    fn templates_substitute_placeholders() {
        let mut values = HashMap::new();
        values.insert("count", "3".to_string());
        values.insert("total", "10".to_string());
        let rendered = render_template(":count of :total records failed.", &values);
        assert_eq!(rendered, "3 of 10 records failed.");
    }

    #[test]
    fn longer_placeholders_substitute_first() {
        let mut values = HashMap::new();
        values.insert("count", "2".to_string());
        values.insert("countTotal", "5".to_string());
        let rendered = render_template(":count/:countTotal", &values);
        assert_eq!(rendered, "2/5");
    }

    #[test]
    fn recording_dispatcher_remembers_order() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.dispatch(Notification::success("first"));
        dispatcher.dispatch(Notification::danger("second"));
        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].title, "first");
        assert_eq!(sent[1].title, "second");
    }

    #[test]
    fn jsonl_log_appends_and_reads_back() {
        let path = std::env::temp_dir().join(format!(
            "formwork_notify_test_{}_{}.jsonl",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let log = JsonlNotificationLog::new(path.clone());
        log.dispatch(Notification::success("first"));
        log.dispatch(Notification::danger("second").body("details"));

        let read = log.read_notifications().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].title, "first");
        assert_eq!(read[1].body.as_deref(), Some("details"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn serialization_round_trip() {
        let notification = Notification::success("Saved").body("Post saved.");
        let serialized = serde_json::to_string(&notification).unwrap();
        let deserialized: Notification = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, notification);
    }
}
