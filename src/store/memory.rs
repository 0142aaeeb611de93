//! In-memory store backend.
//!
//! Keeps every aggregate in a `HashMap` behind a `tokio` lock and evaluates
//! scope predicates row by row, mirroring what a document database would do
//! with the scope folded into the query. Conditional writes compare versions
//! under the write lock, so the optimistic-concurrency contract holds without
//! a real database.

use std::collections::{BTreeMap, HashMap};
use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::client::{Client, ClientStatus};
use crate::model::project::Project;
use crate::policy::ClientScope;

use super::{
    ClientFilter, ClientStats, ClientStore, CurrencyCount, Page, PageRequest, ProjectFilter,
    ProjectQueryScope, ProjectStats, ProjectStore, SortOrder, UserRecord, UserStore,
};

#[derive(Default)]
pub struct MemoryBackend {
    clients: RwLock<HashMap<Uuid, Client>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a directory entry. The directory itself is read-only through the
    /// store traits; population happens out of band.
    pub async fn add_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }
}

fn matches_search(haystacks: &[&str], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(&needle))
}

fn client_matches(client: &Client, filter: &ClientFilter) -> bool {
    if !filter.scope.matches(client.engagement_manager) {
        return false;
    }
    if let Some(status) = filter.status
        && client.status != status
    {
        return false;
    }
    if let Some(currency) = filter.currency
        && client.currency != currency
    {
        return false;
    }
    if let Some(search) = &filter.search {
        let description = client.description.as_deref().unwrap_or("");
        if !matches_search(&[&client.name, &client.code, description], search) {
            return false;
        }
    }
    true
}

fn project_matches(project: &Project, filter: &ProjectFilter) -> bool {
    if !filter.scope.matches(project) {
        return false;
    }
    if let Some(status) = filter.status
        && project.status != status
    {
        return false;
    }
    if let Some(client) = filter.client
        && project.client != client
    {
        return false;
    }
    if let Some(manager) = filter.project_manager
        && project.project_manager != manager
    {
        return false;
    }
    if let Some(priority) = filter.priority
        && project.priority != priority
    {
        return false;
    }
    if let Some(from) = filter.start_date_from
        && project.start_date < from
    {
        return false;
    }
    if let Some(to) = filter.start_date_to
        && project.start_date > to
    {
        return false;
    }
    if let Some(search) = &filter.search {
        let description = project.description.as_deref().unwrap_or("");
        let mut fields = vec![project.name.as_str(), description];
        fields.extend(project.tags.iter().map(String::as_str));
        if !matches_search(&fields, search) {
            return false;
        }
    }
    true
}

fn compare_clients(a: &Client, b: &Client, field: &str) -> Ordering {
    match field {
        "name" => a.name.cmp(&b.name),
        "code" => a.code.cmp(&b.code),
        "status" => a.status.as_str().cmp(b.status.as_str()),
        "currency" => a.currency.as_str().cmp(b.currency.as_str()),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        _ => a.created_at.cmp(&b.created_at),
    }
}

fn compare_projects(a: &Project, b: &Project, field: &str) -> Ordering {
    match field {
        "name" => a.name.cmp(&b.name),
        "status" => a.status.as_str().cmp(b.status.as_str()),
        "priority" => a.priority.rank().cmp(&b.priority.rank()),
        "progress" => a.progress.cmp(&b.progress),
        "start_date" => a.start_date.cmp(&b.start_date),
        "end_date" => a.end_date.cmp(&b.end_date),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        _ => a.created_at.cmp(&b.created_at),
    }
}

/// Sort, window, and assemble a page. Ties break on id so ordering stays
/// stable across calls.
fn paginate<T, F, K>(mut items: Vec<T>, page: &PageRequest, cmp: F, id: K) -> Page<T>
where
    F: Fn(&T, &T) -> Ordering,
    K: Fn(&T) -> Uuid,
{
    items.sort_by(|a, b| {
        let ord = cmp(a, b);
        let ord = match page.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| id(a).cmp(&id(b)))
    });

    let total = items.len() as u64;
    let current = page.page.max(1);
    let per_page = page.per_page.max(1);
    let skip = (current as usize - 1).saturating_mul(per_page as usize);
    let window: Vec<T> = items
        .into_iter()
        .skip(skip)
        .take(per_page as usize)
        .collect();
    Page::assemble(window, total, current, per_page)
}

#[async_trait]
impl ClientStore for MemoryBackend {
    async fn insert_client(&self, client: Client) -> Result<Client, StoreError> {
        let mut clients = self.clients.write().await;
        let code = client.code.to_uppercase();
        if clients.values().any(|c| c.code.to_uppercase() == code) {
            return Err(StoreError::Duplicate { field: "code" });
        }
        clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn find_clients(
        &self,
        filter: &ClientFilter,
        page: &PageRequest,
    ) -> Result<Page<Client>, StoreError> {
        let clients = self.clients.read().await;
        let matched: Vec<Client> = clients
            .values()
            .filter(|c| client_matches(c, filter))
            .cloned()
            .collect();
        let field = page.sort_by.clone().unwrap_or_default();
        Ok(paginate(
            matched,
            page,
            |a, b| compare_clients(a, b, &field),
            |c| c.id,
        ))
    }

    async fn find_client(
        &self,
        id: Uuid,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError> {
        let clients = self.clients.read().await;
        Ok(clients
            .get(&id)
            .filter(|c| scope.matches(c.engagement_manager))
            .cloned())
    }

    async fn replace_client(
        &self,
        client: Client,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError> {
        let mut clients = self.clients.write().await;
        let Some(existing) = clients.get(&client.id) else {
            return Ok(None);
        };
        if !scope.matches(existing.engagement_manager) || existing.version != client.version {
            return Ok(None);
        }
        let code = client.code.to_uppercase();
        if clients
            .values()
            .any(|c| c.id != client.id && c.code.to_uppercase() == code)
        {
            return Err(StoreError::Duplicate { field: "code" });
        }
        let mut stored = client;
        stored.version += 1;
        clients.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn delete_client(
        &self,
        id: Uuid,
        scope: &ClientScope,
    ) -> Result<Option<Client>, StoreError> {
        let mut clients = self.clients.write().await;
        let in_scope = clients
            .get(&id)
            .is_some_and(|c| scope.matches(c.engagement_manager));
        if !in_scope {
            return Ok(None);
        }
        Ok(clients.remove(&id))
    }

    async fn client_ids_owned_by(&self, user: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let clients = self.clients.read().await;
        Ok(clients
            .values()
            .filter(|c| c.engagement_manager == user)
            .map(|c| c.id)
            .collect())
    }

    async fn client_stats(&self, scope: &ClientScope) -> Result<ClientStats, StoreError> {
        let clients = self.clients.read().await;
        let mut stats = ClientStats::default();
        let mut by_currency: BTreeMap<&'static str, CurrencyCount> = BTreeMap::new();
        for client in clients
            .values()
            .filter(|c| scope.matches(c.engagement_manager))
        {
            stats.total_clients += 1;
            match client.status {
                ClientStatus::Active => stats.active_clients += 1,
                ClientStatus::Prospect => stats.prospects += 1,
                _ => {}
            }
            stats.total_revenue += client.metrics.total_revenue;
            stats.total_documents += client.documents.len() as u64;
            by_currency
                .entry(client.currency.as_str())
                .or_insert(CurrencyCount {
                    currency: client.currency,
                    count: 0,
                })
                .count += 1;
        }
        stats.currency_breakdown = by_currency.into_values().collect();
        Ok(stats)
    }
}

#[async_trait]
impl ProjectStore for MemoryBackend {
    async fn insert_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn find_projects(
        &self,
        filter: &ProjectFilter,
        page: &PageRequest,
    ) -> Result<Page<Project>, StoreError> {
        let projects = self.projects.read().await;
        let matched: Vec<Project> = projects
            .values()
            .filter(|p| project_matches(p, filter))
            .cloned()
            .collect();
        let field = page.sort_by.clone().unwrap_or_default();
        Ok(paginate(
            matched,
            page,
            |a, b| compare_projects(a, b, &field),
            |p| p.id,
        ))
    }

    async fn find_project(
        &self,
        id: Uuid,
        scope: &ProjectQueryScope,
    ) -> Result<Option<Project>, StoreError> {
        let projects = self.projects.read().await;
        Ok(projects.get(&id).filter(|p| scope.matches(p)).cloned())
    }

    async fn replace_project(&self, project: Project) -> Result<Option<Project>, StoreError> {
        let mut projects = self.projects.write().await;
        let Some(existing) = projects.get(&project.id) else {
            return Ok(None);
        };
        if existing.version != project.version {
            return Ok(None);
        }
        let mut stored = project;
        stored.version += 1;
        projects.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn delete_project(&self, id: Uuid, expected_version: u64) -> Result<bool, StoreError> {
        let mut projects = self.projects.write().await;
        let matched = projects.get(&id).is_some_and(|p| p.version == expected_version);
        if matched {
            projects.remove(&id);
        }
        Ok(matched)
    }

    async fn project_stats(&self, scope: &ProjectQueryScope) -> Result<ProjectStats, StoreError> {
        use crate::model::project::ProjectStatus;

        let projects = self.projects.read().await;
        let mut stats = ProjectStats::default();
        let mut progress_sum: u64 = 0;
        for project in projects.values().filter(|p| scope.matches(p)) {
            stats.total_projects += 1;
            match project.status {
                ProjectStatus::Active => stats.active_projects += 1,
                ProjectStatus::Completed => stats.completed_projects += 1,
                _ => {}
            }
            if project.is_overdue() {
                stats.overdue_projects += 1;
            }
            stats.total_budget_allocated += project.budget.allocated;
            stats.total_budget_spent += project.budget.spent;
            progress_sum += u64::from(project.progress);
        }
        if stats.total_projects > 0 {
            stats.average_progress = progress_sum as f64 / stats.total_projects as f64;
        }
        Ok(stats)
    }
}

#[async_trait]
impl UserStore for MemoryBackend {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }
}
