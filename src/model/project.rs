//! The Project aggregate: entity plus team members, tasks, milestones, notes
//! and budget, with synchronously recomputed derived metrics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationErrors;
use crate::model::{Currency, check_len, check_opt_len};

pub const MAX_NOTE_LEN: usize = 2000;

/// Lifecycle states. Transitions are constrained to
/// `planning -> active -> {on_hold <-> active} -> completed`, with
/// `cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Planning, Active)
                | (Planning, Cancelled)
                | (Active, OnHold)
                | (Active, Completed)
                | (Active, Cancelled)
                | (OnHold, Active)
                | (OnHold, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl ProjectPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Numeric severity for sorting; higher is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    #[default]
    Pending,
    Completed,
    Overdue,
}

/// At most one entry per user; re-adding a user updates role and rate in
/// place (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub hourly_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: MilestoneStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectNote {
    pub content: String,
    pub author: Uuid,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub allocated: Decimal,
    pub spent: Decimal,
    pub currency: Currency,
}

impl Budget {
    fn new(allocated: Decimal, currency: Currency) -> Self {
        Self {
            allocated,
            spent: Decimal::ZERO,
            currency,
        }
    }
}

/// Derived counters. Never settable by callers; recomputed on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub total_hours: Decimal,
    pub completed_tasks: u32,
    pub total_tasks: u32,
    pub overdue_tasks: u32,
    /// Percent spent of allocated; can exceed 100 when overspent.
    pub budget_utilization: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Optimistic-concurrency version, bumped by the store on every replace.
    pub version: u64,
    pub name: String,
    pub description: Option<String>,
    pub client: Uuid,
    pub project_manager: Uuid,
    pub team_members: Vec<TeamMember>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    /// Percent complete, derived from tasks whenever tasks exist.
    pub progress: u8,
    pub budget: Budget,
    pub milestones: Vec<Milestone>,
    pub tasks: Vec<Task>,
    pub notes: Vec<ProjectNote>,
    pub tags: Vec<String>,
    pub metrics: ProjectMetrics,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub client: Uuid,
    pub project_manager: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub priority: Option<ProjectPriority>,
    pub budget_allocated: Option<Decimal>,
    /// Resolved by the coordinator: explicit value or the client's currency.
    pub budget_currency: Option<Currency>,
    pub tags: Vec<String>,
}

/// Update parameters. Status is excluded on purpose: status changes go
/// through [`Project::update_status`] with its own permission row. Derived
/// fields (progress, metrics) have no patch representation at all, so
/// caller-supplied values are ignored by construction.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub project_manager: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub priority: Option<ProjectPriority>,
    pub budget_allocated: Option<Decimal>,
    pub budget_spent: Option<Decimal>,
    pub budget_currency: Option<Currency>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
}

impl Project {
    pub fn create(input: NewProject, creator: Uuid) -> Result<Self, ValidationErrors> {
        let now = Utc::now();
        let project = Self {
            id: Uuid::new_v4(),
            version: 1,
            name: input.name.trim().to_string(),
            description: input.description,
            client: input.client,
            project_manager: input.project_manager,
            team_members: Vec::new(),
            start_date: input.start_date,
            end_date: input.end_date,
            actual_start_date: None,
            actual_end_date: None,
            status: ProjectStatus::Planning,
            priority: input.priority.unwrap_or_default(),
            progress: 0,
            budget: Budget::new(
                input.budget_allocated.unwrap_or(Decimal::ZERO),
                input.budget_currency.unwrap_or(Currency::Usd),
            ),
            milestones: Vec::new(),
            tasks: Vec::new(),
            notes: Vec::new(),
            tags: input.tags,
            metrics: ProjectMetrics::default(),
            created_by: creator,
            created_at: now,
            updated_at: now,
        };
        project.validate()?;
        Ok(project)
    }

    pub fn apply(&mut self, patch: ProjectPatch) -> Result<(), ValidationErrors> {
        let mut candidate = self.clone();
        if let Some(name) = patch.name {
            candidate.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            candidate.description = description;
        }
        if let Some(project_manager) = patch.project_manager {
            candidate.project_manager = project_manager;
        }
        if let Some(start_date) = patch.start_date {
            candidate.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            candidate.end_date = end_date;
        }
        if let Some(priority) = patch.priority {
            candidate.priority = priority;
        }
        if let Some(allocated) = patch.budget_allocated {
            candidate.budget.allocated = allocated;
        }
        if let Some(spent) = patch.budget_spent {
            candidate.budget.spent = spent;
        }
        if let Some(currency) = patch.budget_currency {
            candidate.budget.currency = currency;
        }
        if let Some(tags) = patch.tags {
            candidate.tags = tags;
        }
        candidate.validate()?;
        candidate.recompute_derived();
        candidate.updated_at = Utc::now();
        *self = candidate;
        Ok(())
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_len(&mut errors, "name", &self.name, 1, 200);
        check_opt_len(&mut errors, "description", self.description.as_deref(), 2000);
        if self.end_date < self.start_date {
            errors.push("endDate", "must be on or after the start date");
        }
        if self.budget.allocated < Decimal::ZERO {
            errors.push("budget.allocated", "must not be negative");
        }
        if self.budget.spent < Decimal::ZERO {
            errors.push("budget.spent", "must not be negative");
        }
        errors.into_result()
    }

    /// Transition the lifecycle state, enforcing the status diagram.
    ///
    /// Entering `active` stamps `actual_start_date` if unset; entering
    /// `completed` stamps `actual_end_date` and forces progress to 100
    /// regardless of the task completion ratio.
    pub fn update_status(&mut self, next: ProjectStatus) -> Result<(), ValidationErrors> {
        if !self.status.can_transition_to(next) {
            let mut errors = ValidationErrors::new();
            errors.push(
                "status",
                format!(
                    "cannot transition from '{}' to '{}'",
                    self.status.as_str(),
                    next.as_str()
                ),
            );
            return Err(errors);
        }

        self.status = next;
        let now = Utc::now();
        if next == ProjectStatus::Active && self.actual_start_date.is_none() {
            self.actual_start_date = Some(now);
        }
        if next == ProjectStatus::Completed {
            self.actual_end_date = Some(now);
        }
        self.recompute_derived();
        self.updated_at = now;
        Ok(())
    }

    /// Add or update a team member. Idempotent per user: an existing entry is
    /// updated in place (last write wins on role and rate), never duplicated.
    pub fn add_team_member(
        &mut self,
        user: Uuid,
        role: Option<String>,
        hourly_rate: Decimal,
    ) -> Result<(), ValidationErrors> {
        if hourly_rate < Decimal::ZERO {
            let mut errors = ValidationErrors::new();
            errors.push("hourlyRate", "must not be negative");
            return Err(errors);
        }
        let role = role
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "team_member".to_string());

        if let Some(existing) = self.team_members.iter_mut().find(|m| m.user == user) {
            existing.role = role;
            existing.hourly_rate = hourly_rate;
        } else {
            self.team_members.push(TeamMember {
                user,
                role,
                joined_at: Utc::now(),
                hourly_rate,
            });
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a team member; a missing user is a no-op.
    pub fn remove_team_member(&mut self, user: Uuid) -> bool {
        let before = self.team_members.len();
        self.team_members.retain(|m| m.user != user);
        let removed = self.team_members.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn is_team_member(&self, user: Uuid) -> bool {
        self.team_members.iter().any(|m| m.user == user)
    }

    pub fn add_task(&mut self, input: NewTask, creator: Uuid) -> Result<Uuid, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_len(&mut errors, "title", &input.title, 1, 200);
        check_opt_len(&mut errors, "description", input.description.as_deref(), 1000);
        if input.estimated_hours.is_some_and(|h| h < Decimal::ZERO) {
            errors.push("estimatedHours", "must not be negative");
        }
        errors.into_result()?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        self.tasks.push(Task {
            id,
            title: input.title.trim().to_string(),
            description: input.description,
            assigned_to: input.assigned_to,
            status: TaskStatus::Todo,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date,
            completed_at: None,
            estimated_hours: input.estimated_hours,
            actual_hours: None,
            created_by: creator,
            created_at: now,
            updated_at: now,
        });
        self.recompute_derived();
        self.updated_at = now;
        Ok(id)
    }

    pub fn add_milestone(&mut self, input: NewMilestone) -> Result<Uuid, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_len(&mut errors, "title", &input.title, 1, 200);
        check_opt_len(&mut errors, "description", input.description.as_deref(), 1000);
        errors.into_result()?;

        let id = Uuid::new_v4();
        self.milestones.push(Milestone {
            id,
            title: input.title.trim().to_string(),
            description: input.description,
            due_date: input.due_date,
            status: MilestoneStatus::Pending,
            completed_at: None,
            created_at: Utc::now(),
        });
        self.recompute_derived();
        self.updated_at = Utc::now();
        Ok(id)
    }

    pub fn add_note(
        &mut self,
        content: &str,
        author: Uuid,
        is_private: bool,
    ) -> Result<(), ValidationErrors> {
        let content = content.trim();
        let mut errors = ValidationErrors::new();
        if content.is_empty() {
            errors.push("content", "note content is required");
        } else if content.chars().count() > MAX_NOTE_LEN {
            errors.push(
                "content",
                format!("cannot be more than {MAX_NOTE_LEN} characters"),
            );
        }
        errors.into_result()?;

        self.notes.push(ProjectNote {
            content: content.to_string(),
            author,
            is_private,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Recompute every derived field from the current embedded collections.
    /// Runs synchronously inside each mutating method.
    fn recompute_derived(&mut self) {
        let now = Utc::now();
        let total = self.tasks.len() as u32;
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as u32;
        let overdue = self
            .tasks
            .iter()
            .filter(|t| {
                t.status != TaskStatus::Completed && t.due_date.is_some_and(|due| due < now)
            })
            .count() as u32;

        self.metrics.total_tasks = total;
        self.metrics.completed_tasks = completed;
        self.metrics.overdue_tasks = overdue;
        self.metrics.total_hours = self
            .tasks
            .iter()
            .filter_map(|t| t.actual_hours)
            .sum::<Decimal>();

        // With no tasks, progress keeps its last value.
        if total > 0 {
            self.progress = ((f64::from(completed) / f64::from(total)) * 100.0).round() as u8;
        }
        if self.status == ProjectStatus::Completed {
            self.progress = 100;
        }

        self.metrics.budget_utilization = if self.budget.allocated > Decimal::ZERO {
            (Decimal::from(100) * self.budget.spent / self.budget.allocated)
                .round()
                .to_u32()
                .unwrap_or(u32::MAX)
        } else {
            0
        };
    }

    /// Never overdue once completed or cancelled.
    pub fn is_overdue(&self) -> bool {
        !self.status.is_terminal() && self.end_date < Utc::now()
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Days until the planned end date; negative once past it.
    pub fn days_remaining(&self) -> i64 {
        (self.end_date - Utc::now()).num_days()
    }

    pub fn team_size(&self) -> usize {
        self.team_members.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use super::*;

    fn new_project() -> Project {
        Project::create(
            NewProject {
                name: "Platform rebuild".to_string(),
                description: None,
                client: Uuid::new_v4(),
                project_manager: Uuid::new_v4(),
                start_date: Utc::now(),
                end_date: Utc::now() + Duration::days(90),
                priority: None,
                budget_allocated: Some(dec!(10000)),
                budget_currency: Some(Currency::Eur),
                tags: Vec::new(),
            },
            Uuid::new_v4(),
        )
        .expect("valid project")
    }

    fn task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..NewTask::default()
        }
    }

    #[test]
    fn create_rejects_end_before_start() {
        let now = Utc::now();
        let err = Project::create(
            NewProject {
                name: "Backwards".to_string(),
                description: None,
                client: Uuid::new_v4(),
                project_manager: Uuid::new_v4(),
                start_date: now,
                end_date: now - Duration::days(1),
                priority: None,
                budget_allocated: None,
                budget_currency: None,
                tags: Vec::new(),
            },
            Uuid::new_v4(),
        )
        .expect_err("invalid dates");
        assert_eq!(err.0[0].field, "endDate");
    }

    #[test]
    fn progress_derives_from_completed_tasks() {
        let mut project = new_project();
        for title in ["a", "b", "c", "d"] {
            project.add_task(task(title), project.created_by).unwrap();
        }
        project.tasks[0].status = TaskStatus::Completed;
        project.apply(ProjectPatch::default()).unwrap();

        assert_eq!(project.progress, 25);
        assert_eq!(project.metrics.total_tasks, 4);
        assert_eq!(project.metrics.completed_tasks, 1);
    }

    #[test]
    fn progress_is_untouched_by_taskless_updates() {
        let mut project = new_project();
        project.progress = 40;
        project
            .apply(ProjectPatch {
                name: Some("Renamed".to_string()),
                ..ProjectPatch::default()
            })
            .unwrap();
        assert_eq!(project.progress, 40);
    }

    #[test]
    fn budget_utilization_rounds_percent_spent() {
        let mut project = new_project();
        project
            .apply(ProjectPatch {
                budget_spent: Some(dec!(3333)),
                ..ProjectPatch::default()
            })
            .unwrap();
        assert_eq!(project.metrics.budget_utilization, 33);
    }

    #[test]
    fn status_transitions_follow_the_diagram() {
        let mut project = new_project();
        assert!(project.update_status(ProjectStatus::Completed).is_err());
        project.update_status(ProjectStatus::Active).unwrap();
        let started = project.actual_start_date.expect("stamped on activation");

        project.update_status(ProjectStatus::OnHold).unwrap();
        project.update_status(ProjectStatus::Active).unwrap();
        // Re-activation keeps the original start stamp.
        assert_eq!(project.actual_start_date, Some(started));

        project.update_status(ProjectStatus::Completed).unwrap();
        assert!(project.actual_end_date.is_some());
        assert_eq!(project.progress, 100);
        assert!(project.update_status(ProjectStatus::Planning).is_err());
        assert!(project.update_status(ProjectStatus::Cancelled).is_err());
    }

    #[test]
    fn completion_forces_full_progress_despite_open_tasks() {
        let mut project = new_project();
        project.add_task(task("open"), project.created_by).unwrap();
        project.update_status(ProjectStatus::Active).unwrap();
        project.update_status(ProjectStatus::Completed).unwrap();
        assert_eq!(project.progress, 100);
        assert_eq!(project.metrics.completed_tasks, 0);
    }

    #[test]
    fn cancelled_is_reachable_from_any_open_state_and_never_overdue() {
        let mut project = new_project();
        project.end_date = Utc::now() - Duration::days(1);
        project.start_date = project.end_date - Duration::days(10);
        assert!(project.is_overdue());

        project.update_status(ProjectStatus::Cancelled).unwrap();
        assert!(!project.is_overdue());
    }

    #[test]
    fn team_membership_is_idempotent_with_last_write_wins() {
        let mut project = new_project();
        let user = Uuid::new_v4();

        project
            .add_team_member(user, Some("developer".to_string()), dec!(80))
            .unwrap();
        project
            .add_team_member(user, Some("lead".to_string()), dec!(95))
            .unwrap();

        assert_eq!(project.team_size(), 1);
        assert_eq!(project.team_members[0].role, "lead");
        assert_eq!(project.team_members[0].hourly_rate, dec!(95));

        assert!(project.remove_team_member(user));
        assert!(!project.remove_team_member(user));
    }

    #[test]
    fn negative_hourly_rate_is_rejected() {
        let mut project = new_project();
        let err = project
            .add_team_member(Uuid::new_v4(), None, dec!(-1))
            .expect_err("negative rate");
        assert_eq!(err.0[0].field, "hourlyRate");
    }

    #[test]
    fn notes_respect_privacy_flag_and_length() {
        let mut project = new_project();
        let author = Uuid::new_v4();
        assert!(project.add_note("", author, false).is_err());
        project.add_note("status call notes", author, true).unwrap();
        assert!(project.notes[0].is_private);
    }

    #[test]
    fn overdue_task_counting_ignores_completed_tasks() {
        let mut project = new_project();
        project
            .add_task(
                NewTask {
                    title: "late".to_string(),
                    due_date: Some(Utc::now() - Duration::days(2)),
                    ..NewTask::default()
                },
                project.created_by,
            )
            .unwrap();
        project
            .add_task(
                NewTask {
                    title: "late but done".to_string(),
                    due_date: Some(Utc::now() - Duration::days(2)),
                    ..NewTask::default()
                },
                project.created_by,
            )
            .unwrap();
        project.tasks[1].status = TaskStatus::Completed;
        project.apply(ProjectPatch::default()).unwrap();

        assert_eq!(project.metrics.overdue_tasks, 1);
    }
}
