//! Project coordinator.
//!
//! Project visibility is two-sided: engagement managers see projects attached
//! to clients they own (plus anything they manage or sit on), resource
//! managers only what they manage or sit on. The abstract policy scope is
//! translated into a concrete row predicate here, after resolving the
//! principal's owned client ids. Instance-level rules (edit, delete, status,
//! team) are then re-checked on every loaded copy inside the write-retry
//! loop.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::Principal;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::model::project::{
    NewMilestone, NewProject, NewTask, Project, ProjectPatch, ProjectPriority, ProjectStatus,
};
use crate::policy::{self, ClientScope, ProjectScope};
use crate::store::{Database, Page, ProjectFilter, ProjectQueryScope, ProjectStats, SortOrder};

use super::{MAX_WRITE_RETRIES, RETRIES_EXHAUSTED, page_request, with_timeout};

#[derive(Debug, Clone, Default)]
pub struct ProjectListRequest {
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub client: Option<Uuid>,
    pub project_manager: Option<Uuid>,
    pub priority: Option<ProjectPriority>,
    pub start_date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub start_date_to: Option<chrono::DateTime<chrono::Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

pub struct ProjectService {
    db: Arc<dyn Database>,
    config: ServiceConfig,
}

impl ProjectService {
    pub fn new(db: Arc<dyn Database>, config: ServiceConfig) -> Self {
        Self { db, config }
    }

    /// Translate the policy scope into a row predicate. The engagement-
    /// manager variant needs the owned client ids resolved from the store.
    async fn query_scope(&self, principal: &Principal) -> Result<ProjectQueryScope, ServiceError> {
        let scope = match policy::project_scope(principal) {
            ProjectScope::Unrestricted => ProjectQueryScope::Unrestricted,
            ProjectScope::Engaged(user) => {
                let client_ids =
                    with_timeout(self.config.io_timeout, self.db.client_ids_owned_by(user))
                        .await?;
                ProjectQueryScope::Involved { user, client_ids }
            }
            ProjectScope::Assigned(user) => ProjectQueryScope::Assigned(user),
        };
        tracing::debug!(principal = %principal.id, role = principal.role.as_str(), ?scope);
        Ok(scope)
    }

    /// Create a project. The referenced client is resolved and access-checked
    /// first (engagement managers may only attach projects to clients they
    /// own), the referenced manager must exist in the user directory, and the
    /// budget currency defaults to the client's.
    pub async fn create(
        &self,
        principal: &Principal,
        mut input: NewProject,
    ) -> Result<Project, ServiceError> {
        if !policy::can_create_project(principal) {
            return Err(ServiceError::AccessDenied("role may not create projects"));
        }

        let client = with_timeout(
            self.config.io_timeout,
            self.db.find_client(input.client, &ClientScope::Unrestricted),
        )
        .await?
        .ok_or(ServiceError::NotFound("client"))?;
        if !principal.is_admin() && client.engagement_manager != principal.id {
            return Err(ServiceError::AccessDenied(
                "projects may only be attached to clients you manage",
            ));
        }

        with_timeout(self.config.io_timeout, self.db.find_user(input.project_manager))
            .await?
            .ok_or(ServiceError::NotFound("project manager"))?;

        if input.budget_currency.is_none() {
            input.budget_currency = Some(client.currency);
        }

        let project = Project::create(input, principal.id)?;
        let stored =
            with_timeout(self.config.io_timeout, self.db.insert_project(project)).await?;
        tracing::info!(project = %stored.id, client = %stored.client, "project created");
        Ok(stored)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        request: ProjectListRequest,
    ) -> Result<Page<Project>, ServiceError> {
        let scope = self.query_scope(principal).await?;
        let filter = ProjectFilter {
            scope,
            search: request.search,
            status: request.status,
            client: request.client,
            project_manager: request.project_manager,
            priority: request.priority,
            start_date_from: request.start_date_from,
            start_date_to: request.start_date_to,
        };
        let page = page_request(
            &self.config,
            request.page,
            request.per_page,
            request.sort_by,
            request.sort_order,
        );
        with_timeout(self.config.io_timeout, self.db.find_projects(&filter, &page)).await
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        with_timeout(self.config.io_timeout, self.db.find_project(id, &scope))
            .await?
            .ok_or(ServiceError::NotFound("project"))
    }

    async fn load(
        &self,
        id: Uuid,
        scope: &ProjectQueryScope,
    ) -> Result<Project, ServiceError> {
        with_timeout(self.config.io_timeout, self.db.find_project(id, scope))
            .await?
            .ok_or(ServiceError::NotFound("project"))
    }

    async fn replace(&self, project: Project) -> Result<Option<Project>, ServiceError> {
        with_timeout(self.config.io_timeout, self.db.replace_project(project)).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_edit_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager, the creator, or an admin may edit",
                ));
            }
            project.apply(patch.clone())?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let project = self.load(id, &scope).await?;
            if !policy::can_delete_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the creator or an admin may delete a project",
                ));
            }
            let deleted = with_timeout(
                self.config.io_timeout,
                self.db.delete_project(id, project.version),
            )
            .await?;
            if deleted {
                tracing::info!(project = %id, "project deleted");
                return Ok(());
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn update_status(
        &self,
        principal: &Principal,
        id: Uuid,
        next: ProjectStatus,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_manage_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager or an admin may change status",
                ));
            }
            project.update_status(next)?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn add_team_member(
        &self,
        principal: &Principal,
        id: Uuid,
        user: Uuid,
        role: Option<String>,
        hourly_rate: Decimal,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        with_timeout(self.config.io_timeout, self.db.find_user(user))
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_manage_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager or an admin may manage the team",
                ));
            }
            project.add_team_member(user, role.clone(), hourly_rate)?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn remove_team_member(
        &self,
        principal: &Principal,
        id: Uuid,
        user: Uuid,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_manage_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager or an admin may manage the team",
                ));
            }
            project.remove_team_member(user);
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn add_task(
        &self,
        principal: &Principal,
        id: Uuid,
        input: NewTask,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_edit_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager, the creator, or an admin may add tasks",
                ));
            }
            project.add_task(input.clone(), principal.id)?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn add_milestone(
        &self,
        principal: &Principal,
        id: Uuid,
        input: NewMilestone,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_edit_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager, the creator, or an admin may add milestones",
                ));
            }
            project.add_milestone(input.clone())?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn add_note(
        &self,
        principal: &Principal,
        id: Uuid,
        content: &str,
        is_private: bool,
    ) -> Result<Project, ServiceError> {
        let scope = self.query_scope(principal).await?;
        for _ in 0..MAX_WRITE_RETRIES {
            let mut project = self.load(id, &scope).await?;
            if !policy::can_manage_project(principal, &project) {
                return Err(ServiceError::AccessDenied(
                    "only the project manager or an admin may add notes",
                ));
            }
            project.add_note(content, principal.id, is_private)?;
            if let Some(stored) = self.replace(project).await? {
                return Ok(stored);
            }
        }
        Err(ServiceError::UpstreamUnavailable(RETRIES_EXHAUSTED.into()))
    }

    pub async fn stats(&self, principal: &Principal) -> Result<ProjectStats, ServiceError> {
        let scope = self.query_scope(principal).await?;
        with_timeout(self.config.io_timeout, self.db.project_stats(&scope)).await
    }
}
