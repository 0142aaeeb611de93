//! Access policy engine.
//!
//! Pure, side-effect-free decision functions: given a principal, a resource
//! kind, an action and (for instance-level rules) the loaded resource, decide
//! allow/deny. List and by-id reads additionally get a scope value that the
//! coordinators fold into the persistence query itself, so a guessed id can
//! never bypass the list filter. Any role/action pair not granted here is
//! denied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::model::project::Project;

/// Resources the policy matrix knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Client,
    ClientDocument,
    ClientNote,
    Project,
    ProjectStatus,
    ProjectTeam,
    ProjectNote,
    ProjectTask,
    ProjectMilestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    List,
    Read,
    Update,
    Delete,
}

/// Row filter for client queries. Translated into the persistence filter by
/// the store adapter, and re-asserted on every by-id read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientScope {
    Unrestricted,
    OwnedBy(Uuid),
}

impl ClientScope {
    pub fn matches(&self, engagement_manager: Uuid) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::OwnedBy(owner) => *owner == engagement_manager,
        }
    }
}

/// Row filter for project queries.
///
/// `Engaged` is the engagement-manager view: projects attached to clients the
/// principal owns, or where the principal is project manager or on the team.
/// `Assigned` is the resource-manager view: project manager or team only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    Unrestricted,
    Engaged(Uuid),
    Assigned(Uuid),
}

/// Whether the principal may create clients at all (role-gated, unscoped).
pub fn can_create_client(principal: &Principal) -> bool {
    matches!(principal.role, Role::Admin | Role::EngagementManager)
}

/// Scope filter for client list/read queries. `None` means the role has no
/// access to clients at all.
pub fn client_scope(principal: &Principal) -> Option<ClientScope> {
    match principal.role {
        Role::Admin => Some(ClientScope::Unrestricted),
        Role::EngagementManager => Some(ClientScope::OwnedBy(principal.id)),
        Role::ResourceManager => None,
    }
}

pub fn can_create_project(principal: &Principal) -> bool {
    matches!(principal.role, Role::Admin | Role::EngagementManager)
}

/// Scope filter for project list/read queries. Every role may list projects,
/// just over different row sets.
pub fn project_scope(principal: &Principal) -> ProjectScope {
    match principal.role {
        Role::Admin => ProjectScope::Unrestricted,
        Role::EngagementManager => ProjectScope::Engaged(principal.id),
        Role::ResourceManager => ProjectScope::Assigned(principal.id),
    }
}

/// General project edits: admin, the project manager, or the creator.
pub fn can_edit_project(principal: &Principal, project: &Project) -> bool {
    principal.is_admin()
        || project.project_manager == principal.id
        || project.created_by == principal.id
}

/// Project deletion: admin or the creator only.
pub fn can_delete_project(principal: &Principal, project: &Project) -> bool {
    principal.is_admin() || project.created_by == principal.id
}

/// Status, team and note mutations: admin or the project manager only.
pub fn can_manage_project(principal: &Principal, project: &Project) -> bool {
    principal.is_admin() || project.project_manager == principal.id
}

/// Apply an instance-level rule. Without a loaded instance only admin
/// passes.
fn instance_allows(
    principal: &Principal,
    project: Option<&Project>,
    check: fn(&Principal, &Project) -> bool,
) -> bool {
    match project {
        Some(project) => check(principal, project),
        None => principal.is_admin(),
    }
}

/// The full role matrix as a single decision function.
///
/// Instance-level rules need the loaded project; passing `None` for those
/// rows denies everyone but admin. Client-kind rows are role checks only --
/// per-record ownership is enforced by folding [`ClientScope`] into the
/// query, not here.
pub fn can_perform(
    principal: &Principal,
    resource: ResourceKind,
    action: Action,
    project: Option<&Project>,
) -> bool {
    use Action::*;
    use ResourceKind::*;

    match (resource, action) {
        (Client, Create | List | Read | Update | Delete) => client_scope(principal).is_some(),
        (ClientDocument, Create | Read | Delete) => client_scope(principal).is_some(),
        (ClientNote, Create | Read) => client_scope(principal).is_some(),
        (Project, Create) => can_create_project(principal),
        (Project, List | Read) => true,
        (Project, Update) => instance_allows(principal, project, can_edit_project),
        (Project, Delete) => instance_allows(principal, project, can_delete_project),
        (ProjectStatus, Update) => instance_allows(principal, project, can_manage_project),
        (ProjectTeam, Create | Delete) => instance_allows(principal, project, can_manage_project),
        (ProjectNote, Create) => instance_allows(principal, project, can_manage_project),
        (ProjectTask | ProjectMilestone, Create) => {
            instance_allows(principal, project, can_edit_project)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::project::{NewProject, Project};

    fn principal(role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), role)
    }

    fn project_with(manager: Uuid, creator: Uuid) -> Project {
        Project::create(
            NewProject {
                name: "P".to_string(),
                description: None,
                client: Uuid::new_v4(),
                project_manager: manager,
                start_date: Utc::now(),
                end_date: Utc::now() + Duration::days(1),
                priority: None,
                budget_allocated: None,
                budget_currency: None,
                tags: Vec::new(),
            },
            creator,
        )
        .expect("valid project")
    }

    #[test]
    fn resource_managers_have_no_client_access() {
        let rm = principal(Role::ResourceManager);
        assert_eq!(client_scope(&rm), None);
        assert!(!can_perform(&rm, ResourceKind::Client, Action::List, None));
        assert!(!can_perform(&rm, ResourceKind::ClientDocument, Action::Read, None));
        assert!(!can_create_client(&rm));
        assert!(!can_create_project(&rm));
    }

    #[test]
    fn engagement_managers_are_scoped_to_owned_clients() {
        let em = principal(Role::EngagementManager);
        assert_eq!(client_scope(&em), Some(ClientScope::OwnedBy(em.id)));
        assert!(can_create_client(&em));

        let scope = client_scope(&em).unwrap();
        assert!(scope.matches(em.id));
        assert!(!scope.matches(Uuid::new_v4()));
    }

    #[test]
    fn admin_scopes_are_unrestricted() {
        let admin = principal(Role::Admin);
        assert_eq!(client_scope(&admin), Some(ClientScope::Unrestricted));
        assert_eq!(project_scope(&admin), ProjectScope::Unrestricted);
        assert!(client_scope(&admin).unwrap().matches(Uuid::new_v4()));
    }

    #[test]
    fn project_scopes_differ_by_role() {
        let em = principal(Role::EngagementManager);
        let rm = principal(Role::ResourceManager);
        assert_eq!(project_scope(&em), ProjectScope::Engaged(em.id));
        assert_eq!(project_scope(&rm), ProjectScope::Assigned(rm.id));
    }

    #[test]
    fn project_edit_requires_manager_or_creator() {
        let manager = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let project = project_with(manager, creator);

        let as_manager = Principal::new(manager, Role::ResourceManager);
        let as_creator = Principal::new(creator, Role::EngagementManager);
        let outsider = principal(Role::EngagementManager);

        assert!(can_edit_project(&as_manager, &project));
        assert!(can_edit_project(&as_creator, &project));
        assert!(!can_edit_project(&outsider, &project));

        assert!(!can_delete_project(&as_manager, &project));
        assert!(can_delete_project(&as_creator, &project));

        assert!(can_manage_project(&as_manager, &project));
        assert!(!can_manage_project(&as_creator, &project));
    }

    #[test]
    fn unlisted_pairs_are_denied() {
        let admin = principal(Role::Admin);
        // Notes are append-only; documents cannot be updated in place.
        assert!(!can_perform(&admin, ResourceKind::ClientNote, Action::Delete, None));
        assert!(!can_perform(&admin, ResourceKind::ClientDocument, Action::Update, None));
        assert!(!can_perform(&admin, ResourceKind::ProjectStatus, Action::Create, None));
    }

    #[test]
    fn matrix_matches_instance_helpers() {
        let manager = Uuid::new_v4();
        let project = project_with(manager, Uuid::new_v4());
        let pm = Principal::new(manager, Role::ResourceManager);

        assert!(can_perform(&pm, ResourceKind::ProjectStatus, Action::Update, Some(&project)));
        assert!(can_perform(&pm, ResourceKind::ProjectTeam, Action::Create, Some(&project)));
        assert!(can_perform(&pm, ResourceKind::ProjectNote, Action::Create, Some(&project)));
        assert!(!can_perform(&pm, ResourceKind::Project, Action::Delete, Some(&project)));
        // Without an instance, only admin passes instance-level rows.
        assert!(!can_perform(&pm, ResourceKind::Project, Action::Update, None));
        let admin = principal(Role::Admin);
        assert!(can_perform(&admin, ResourceKind::Project, Action::Update, None));
        assert!(can_perform(&admin, ResourceKind::Project, Action::Delete, Some(&project)));
    }
}
