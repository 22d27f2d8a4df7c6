//! # Bulk Authorization Aggregation
//!
//! Bulk actions operate over a selected-record set. When individual
//! authorization is required, each record is checked on its own and the
//! denials are aggregated into per-reason counts, so the user sees one
//! summary notification instead of one notification per failed record.
//!
//! Counters accumulate as records stream past, never after the fact, so
//! a single-pass record source still yields correct counts even if the
//! pass stops early.

use std::collections::HashMap;

use crate::action::DenialTemplates;
use crate::authorize::{AuthorizationRule, Gate, authorize};
use crate::notify::{Notification, render_template};
use crate::record::Record;

/// Aggregated result of filtering a selection through individual
/// authorization. Built fresh for every invocation; never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    total: usize,
    successful: usize,
    /// Denial reasons in first-seen order with their counts. Identical
    /// messages share one entry.
    reasons: Vec<(String, usize)>,
    denied_without_message: usize,
}

impl BulkReport {
    /// Starts a report over a selection of the given size.
    pub fn new(total: usize) -> Self {
        BulkReport {
            total,
            successful: total,
            reasons: Vec::new(),
            denied_without_message: 0,
        }
    }

    /// Records one authorization denial, keyed by its message if it has
    /// one.
    pub fn deny(&mut self, message: Option<&str>) {
        self.successful = self.successful.saturating_sub(1);
        match message {
            Some(message) => {
                match self.reasons.iter_mut().find(|(m, _)| m == message) {
                    Some((_, count)) => *count += 1,
                    None => self.reasons.push((message.to_string(), 1)),
                }
            }
            None => self.denied_without_message += 1,
        }
    }

    /// Records one record that failed during processing, after it passed
    /// authorization. Processing failures join the same per-reason
    /// aggregate as denials, so the summary notification covers both.
    pub fn fail_processing(&mut self, message: Option<&str>) {
        self.deny(message);
    }

    /// The size of the original selection.
    pub fn total(&self) -> usize {
        self.total
    }

    /// How many records passed.
    pub fn successful(&self) -> usize {
        self.successful
    }

    /// How many records were denied or failed during processing.
    pub fn denied(&self) -> usize {
        self.total - self.successful
    }

    /// Composes the per-reason failure message list.
    ///
    /// A reason with a registered template renders it with `:count`,
    /// `:total`, and `:isAll`; otherwise the raw message is suffixed with
    /// its count. Denials without any message get a generic line.
    pub fn failure_lines(&self, templates: &DenialTemplates) -> Vec<String> {
        let mut lines = Vec::new();
        for (message, count) in &self.reasons {
            let line = match templates.get(message) {
                Some(template) => {
                    let mut values = HashMap::new();
                    values.insert("count", count.to_string());
                    values.insert("total", self.total.to_string());
                    values.insert("isAll", (*count == self.total).to_string());
                    render_template(template, &values)
                }
                None => format!("{} ({} of {})", message, count, self.total),
            };
            lines.push(line);
        }
        if self.denied_without_message > 0 {
            lines.push(format!(
                "{} of {} selected records could not be processed.",
                self.denied_without_message, self.total
            ));
        }
        lines
    }

    /// Builds the aggregated failure notification, or nothing when every
    /// record passed.
    pub fn failure_notification(
        &self,
        title: &str,
        templates: &DenialTemplates,
    ) -> Option<Notification> {
        if self.denied() == 0 {
            return None;
        }
        Some(
            Notification::danger(title)
                .body(self.failure_lines(templates).join("\n"))
                .persistent(),
        )
    }
}

/// Filters a selection through per-record authorization.
///
/// Without a rule the whole selection passes untouched. With one, each
/// record is checked with itself as the subject argument, and denials
/// accumulate into the returned report as the iteration proceeds.
pub fn individually_authorized_records(
    gate: &dyn Gate,
    rule: Option<&AuthorizationRule>,
    records: impl IntoIterator<Item = Record>,
) -> (Vec<Record>, BulkReport) {
    let records: Vec<Record> = records.into_iter().collect();
    let mut report = BulkReport::new(records.len());
    let Some(rule) = rule else {
        return (records, report);
    };
    let mut authorized = Vec::new();
    for record in records {
        let response = authorize(gate, rule, Some(&record), &[]);
        if response.is_allowed() {
            authorized.push(record);
        } else {
            report.deny(response.message());
        }
    }
    (authorized, report)
}
