//! Persistence abstraction.
//!
//! Backend-agnostic store traits with document-store semantics. Scope
//! predicates from the policy engine are part of every filter, so list
//! queries never leak rows and by-id reads/writes re-assert ownership inside
//! the query itself. Writes are conditional on the aggregate's version;
//! a `None`/`false` result means the document is gone or a concurrent writer
//! won, and the coordinator retries from a fresh load.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;
use crate::error::StoreError;
use crate::model::Currency;
use crate::model::client::{Client, ClientStatus};
use crate::model::project::{Project, ProjectPriority, ProjectStatus};
use crate::policy::ClientScope;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Pagination and sorting for list queries. Pages are 1-indexed.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort_by = Some(field.to_string());
        self.sort_order = order;
        self
    }
}

/// One page of results plus the pagination contract fields.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Assemble a page from the already-windowed items and the total match
    /// count.
    pub fn assemble(items: Vec<T>, total_count: u64, page: u32, per_page: u32) -> Self {
        let per_page = u64::from(per_page.max(1));
        let total_pages = (total_count.div_ceil(per_page)) as u32;
        Self {
            items,
            current_page: page,
            total_pages,
            total_count,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Query filter for client lists. The scope is not optional: callers must go
/// through the policy engine to obtain one.
#[derive(Debug, Clone)]
pub struct ClientFilter {
    pub scope: ClientScope,
    pub search: Option<String>,
    pub status: Option<ClientStatus>,
    pub currency: Option<Currency>,
}

impl ClientFilter {
    pub fn scoped(scope: ClientScope) -> Self {
        Self {
            scope,
            search: None,
            status: None,
            currency: None,
        }
    }
}

/// Concrete row predicate for project queries, translated from
/// [`crate::policy::ProjectScope`] by the coordinator (the engagement-manager
/// variant needs the principal's owned client ids resolved first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectQueryScope {
    Unrestricted,
    /// Engagement-manager view: client owned by the user, or user is the
    /// project manager or on the team.
    Involved { user: Uuid, client_ids: Vec<Uuid> },
    /// Resource-manager view: project manager or team member only.
    Assigned(Uuid),
}

impl ProjectQueryScope {
    pub fn matches(&self, project: &Project) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Involved { user, client_ids } => {
                client_ids.contains(&project.client)
                    || project.project_manager == *user
                    || project.is_team_member(*user)
            }
            Self::Assigned(user) => {
                project.project_manager == *user || project.is_team_member(*user)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectFilter {
    pub scope: ProjectQueryScope,
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub client: Option<Uuid>,
    pub project_manager: Option<Uuid>,
    pub priority: Option<ProjectPriority>,
    pub start_date_from: Option<DateTime<Utc>>,
    pub start_date_to: Option<DateTime<Utc>>,
}

impl ProjectFilter {
    pub fn scoped(scope: ProjectQueryScope) -> Self {
        Self {
            scope,
            search: None,
            status: None,
            client: None,
            project_manager: None,
            priority: None,
            start_date_from: None,
            start_date_to: None,
        }
    }
}

/// Scope-filtered client statistics; the currency breakdown is a plain
/// group-by.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientStats {
    pub total_clients: u64,
    pub active_clients: u64,
    pub prospects: u64,
    pub total_revenue: Decimal,
    pub total_documents: u64,
    pub currency_breakdown: Vec<CurrencyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyCount {
    pub currency: Currency,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectStats {
    pub total_projects: u64,
    pub active_projects: u64,
    pub completed_projects: u64,
    pub overdue_projects: u64,
    pub total_budget_allocated: Decimal,
    pub total_budget_spent: Decimal,
    pub average_progress: f64,
}

/// Minimal user directory entry, enough to resolve referenced managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Insert a new client. Fails with `Duplicate` when the (case-normalized)
    /// code is already taken.
    async fn insert_client(&self, client: Client) -> Result<Client, StoreError>;

    async fn find_clients(
        &self,
        filter: &ClientFilter,
        page: &PageRequest,
    ) -> Result<Page<Client>, StoreError>;

    /// By-id read with the scope folded into the query: an out-of-scope id
    /// yields `None`, indistinguishable from a missing record.
    async fn find_client(
        &self,
        id: Uuid,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError>;

    /// Conditional replace matching `{id, scope, version}`. Returns the
    /// stored aggregate (version bumped), or `None` when no document matched.
    async fn replace_client(
        &self,
        client: Client,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError>;

    /// Conditional delete matching `{id, scope}`, returning the removed
    /// record so callers can clean up attached blobs.
    async fn delete_client(
        &self,
        id: Uuid,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError>;

    async fn client_ids_owned_by(&self, user: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn client_stats(&self, scope: &ClientScope) -> Result<ClientStats, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert_project(&self, project: Project) -> Result<Project, StoreError>;

    async fn find_projects(
        &self,
        filter: &ProjectFilter,
        page: &PageRequest,
    ) -> Result<Page<Project>, StoreError>;

    async fn find_project(
        &self,
        id: Uuid,
        scope: &ProjectQueryScope,
    ) -> Result<Option<Project>, StoreError>;

    /// Conditional replace matching `{id, version}`.
    async fn replace_project(&self, project: Project) -> Result<Option<Project>, StoreError>;

    /// Conditional delete matching `{id, version}`.
    async fn delete_project(&self, id: Uuid, expected_version: u64) -> Result<bool, StoreError>;

    async fn project_stats(&self, scope: &ProjectQueryScope) -> Result<ProjectStats, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;
}

/// Backend-agnostic supertrait combining all stores, so coordinators can hold
/// a single `Arc<dyn Database>`.
pub trait Database: ClientStore + ProjectStore + UserStore + Send + Sync {}

impl<T: ClientStore + ProjectStore + UserStore + Send + Sync> Database for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_assembly_computes_the_contract_fields() {
        let page = Page::assemble(vec![1, 2, 3], 23, 2, 10);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_count, 23);
        assert!(page.has_next);
        assert!(page.has_prev);

        let empty: Page<i32> = Page::assemble(Vec::new(), 0, 1, 10);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn page_request_clamps_to_valid_values() {
        let req = PageRequest::new(0, 0);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, 1);
    }
}
