//! Migration scope selection.
//!
//! A [`Scope`] decides which legacy meetings a migration run touches. It is
//! a pure filter: resolution takes the current project and meeting sets and
//! returns the exact record set to migrate, in deterministic (id) order.

use serde::{Deserialize, Serialize};

use crate::model::{parse_timestamp, LegacyMeeting, Project};
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Default number of records committed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Hard ceiling on records a single run may select.
pub const MAX_SELECTABLE_ITEMS: usize = 10_000;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// What subset of legacy meetings a run should consider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScopeFilter {
    /// Every legacy meeting in the store.
    All,
    /// Meetings belonging to any of the given projects.
    Projects { project_ids: Vec<EntityId> },
    /// Meetings whose start falls inside `[from, to)`.
    DateRange { from: Timestamp, to: Timestamp },
    /// Meetings of a single source meeting type (raw legacy type string).
    MeetingType { meeting_type: String },
    /// Incremental: meetings starting at or after the given instant.
    Since { since: Timestamp },
    /// Explicitly selected meeting ids.
    Explicit { meeting_ids: Vec<EntityId> },
}

/// Options modifying how a scope resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeOptions {
    /// Include meetings whose project is archived.
    pub include_archived: bool,
    /// Include meetings flagged as drafts in the source system.
    pub include_drafts: bool,
    /// Commit batch size hint for the orchestrator.
    pub batch_size: usize,
    /// Cap on selected records. Clamped to [`MAX_SELECTABLE_ITEMS`].
    pub max_items: usize,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            include_archived: false,
            include_drafts: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_items: MAX_SELECTABLE_ITEMS,
        }
    }
}

/// A complete scope specification: filter plus options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub filter: ScopeFilter,
    #[serde(default = "ScopeOptions::default")]
    pub options: ScopeOptions,
}

impl Default for Scope {
    fn default() -> Self {
        Self::all()
    }
}

impl Scope {
    /// Scope covering every meeting, default options.
    pub fn all() -> Self {
        Self {
            filter: ScopeFilter::All,
            options: ScopeOptions::default(),
        }
    }

    /// Scope restricted to the given project ids.
    pub fn projects<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        Self {
            filter: ScopeFilter::Projects {
                project_ids: ids.into_iter().map(Into::into).collect(),
            },
            options: ScopeOptions::default(),
        }
    }

    /// Resolve this scope against the current data set.
    ///
    /// Returns the meetings to migrate, sorted by id so repeat resolutions
    /// of the same scope over the same data are identical. Records with
    /// unparseable timestamps are passed through by non-date filters (they
    /// fail individually at conversion) but cannot match date filters.
    pub fn resolve(&self, projects: &[Project], meetings: &[LegacyMeeting]) -> Vec<LegacyMeeting> {
        let archived_projects: Vec<&str> = projects
            .iter()
            .filter(|p| p.archived)
            .map(|p| p.id.as_str())
            .collect();

        let mut selected: Vec<LegacyMeeting> = meetings
            .iter()
            .filter(|m| self.matches(m))
            .filter(|m| self.options.include_drafts || !m.draft)
            .filter(|m| {
                self.options.include_archived
                    || !archived_projects.contains(&m.project_id.as_str())
            })
            .cloned()
            .collect();

        selected.sort_by(|a, b| a.id.cmp(&b.id));
        selected.truncate(self.options.max_items.min(MAX_SELECTABLE_ITEMS));
        selected
    }

    fn matches(&self, meeting: &LegacyMeeting) -> bool {
        match &self.filter {
            ScopeFilter::All => true,
            ScopeFilter::Projects { project_ids } => project_ids.contains(&meeting.project_id),
            ScopeFilter::DateRange { from, to } => match parse_timestamp(&meeting.starts_at) {
                Some(starts) => starts >= *from && starts < *to,
                None => false,
            },
            ScopeFilter::MeetingType { meeting_type } => {
                meeting.meeting_type.eq_ignore_ascii_case(meeting_type)
            }
            ScopeFilter::Since { since } => match parse_timestamp(&meeting.starts_at) {
                Some(starts) => starts >= *since,
                None => false,
            },
            ScopeFilter::Explicit { meeting_ids } => meeting_ids.contains(&meeting.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
