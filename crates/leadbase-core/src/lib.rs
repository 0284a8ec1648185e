//! Core domain model, CSV header normalization, and the activity feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod feed;

pub const CRATE_NAME: &str = "leadbase-core";

/// Number of sample error lines kept per import run.
pub const MAX_SAMPLE_ERRORS: usize = 10;

/// Translate a raw CSV header into an internal column name.
///
/// Known header variants map through a fixed, case-sensitive table; anything
/// else falls back to lowercase with spaces replaced by underscores. Columns
/// that still don't match the internal schema are ignored downstream.
pub fn normalize_header(name: &str) -> String {
    match name.trim() {
        "First Name" => "first_name".to_string(),
        "Last Name" => "last_name".to_string(),
        "Headline" => "headline".to_string(),
        "Location" => "location".to_string(),
        "Current Title" => "current_title".to_string(),
        "Current Company" => "current_company".to_string(),
        "Email Address" => "email_address".to_string(),
        "Phone Number" => "phone_number".to_string(),
        "Profile URL" => "profile_url".to_string(),
        "Active Project" => "active_project".to_string(),
        "Notes" => "notes".to_string(),
        "Feedback" => "feedback".to_string(),
        other => other.to_ascii_lowercase().replace(' ', "_"),
    }
}

/// One normalized CSV row, projected onto the internal lead schema.
///
/// Empty strings mean "not supplied"; the upsert layer decides whether an
/// empty value clears the stored one or preserves it (fill-if-empty fields).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadImport {
    pub first_name: String,
    pub last_name: String,
    pub headline: String,
    pub location: String,
    pub current_title: String,
    pub current_company: String,
    pub email_address: String,
    pub phone_number: String,
    pub profile_url: String,
    pub linkedin_url: String,
    pub active_project: String,
    pub notes: String,
    pub feedback: String,
}

impl LeadImport {
    /// Build a row from raw `(header, value)` pairs. Headers are normalized
    /// first; pairs that don't match an internal column are dropped.
    pub fn from_raw_row<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut row = Self::default();
        for (header, value) in pairs {
            let value = value.trim();
            match normalize_header(header).as_str() {
                "first_name" => row.first_name = value.to_string(),
                "last_name" => row.last_name = value.to_string(),
                "headline" => row.headline = value.to_string(),
                "location" => row.location = value.to_string(),
                "current_title" => row.current_title = value.to_string(),
                "current_company" => row.current_company = value.to_string(),
                "email_address" => row.email_address = value.to_string(),
                "phone_number" => row.phone_number = value.to_string(),
                "profile_url" => row.profile_url = value.to_string(),
                "linkedin_url" => row.linkedin_url = value.to_string(),
                "active_project" => row.active_project = value.to_string(),
                "notes" => row.notes = value.to_string(),
                "feedback" => row.feedback = value.to_string(),
                _ => {}
            }
        }
        row
    }

    /// A row without its natural key cannot be stored.
    pub fn has_profile_url(&self) -> bool {
        !self.profile_url.trim().is_empty()
    }
}

/// Whether an upsert created a new record or touched an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOutcome {
    Inserted,
    Updated,
}

/// Overall status of one upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
        }
    }
}

/// Immutable summary row persisted once per import invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRun {
    pub filename: String,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub rows_failed: i64,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// Result of one server-side dedupe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupeOutcome {
    pub groups_found: i64,
    pub records_removed: i64,
}

/// What the batch importer hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub filename: String,
    pub inserted: i64,
    pub updated: i64,
    pub failed: i64,
    /// Up to [`MAX_SAMPLE_ERRORS`] messages, each tagged with its 1-indexed
    /// data-row number (header row excluded).
    pub sample_errors: Vec<String>,
    pub dedupe: DedupeOutcome,
}

impl ImportSummary {
    pub fn status(&self) -> RunStatus {
        if self.failed == 0 {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

/// Stored lead as read back for the dashboard and AI passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub profile_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub active_project: Option<String>,
    pub notes: Option<String>,
    pub feedback: Option<String>,
    pub viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub viewed_by: Option<String>,
    pub hook: Option<String>,
    pub hook_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_headers_use_the_fixed_table() {
        assert_eq!(normalize_header("First Name"), "first_name");
        assert_eq!(normalize_header("Profile URL"), "profile_url");
        assert_eq!(normalize_header("Email Address"), "email_address");
    }

    #[test]
    fn unknown_headers_fall_back_to_generic_normalization() {
        assert_eq!(normalize_header("LinkedIn URL"), "linkedin_url");
        assert_eq!(normalize_header("Some Odd Column"), "some_odd_column");
    }

    #[test]
    fn lookup_table_is_case_sensitive() {
        // "first name" misses the table but the generic fallback still lands
        // on the same internal column.
        assert_eq!(normalize_header("first name"), "first_name");
        assert_eq!(normalize_header("FIRST NAME"), "first_name");
    }

    #[test]
    fn raw_row_projection_drops_unmatched_columns() {
        let row = LeadImport::from_raw_row(vec![
            ("First Name", "Ada"),
            ("Profile URL", "https://example.com/in/ada"),
            ("Favourite Colour", "teal"),
        ]);
        assert_eq!(row.first_name, "Ada");
        assert_eq!(row.profile_url, "https://example.com/in/ada");
        assert!(row.has_profile_url());
    }

    #[test]
    fn missing_key_is_detected() {
        let row = LeadImport::from_raw_row(vec![("First Name", "Ada"), ("Profile URL", "  ")]);
        assert!(!row.has_profile_url());
    }

    #[test]
    fn summary_status_follows_failure_count() {
        let mut summary = ImportSummary {
            filename: "leads.csv".into(),
            inserted: 4,
            updated: 0,
            failed: 0,
            sample_errors: vec![],
            dedupe: DedupeOutcome::default(),
        };
        assert_eq!(summary.status(), RunStatus::Success);
        summary.failed = 1;
        assert_eq!(summary.status(), RunStatus::Partial);
    }
}
