pub mod credentials;
pub mod handlers;
pub mod middleware;
pub mod session;

use crate::models::job_definition::JobDetails;
use crate::models::user::{Role, User};

/// The logged-in user, inserted into request extensions by `require_login`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub roles: Vec<Role>,
}

impl CurrentUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.user.firstname, self.user.lastname)
    }

    pub fn can_manage_jobs(&self) -> bool {
        self.is_admin() || self.has_role(Role::Teacher)
    }

    /// Admins edit everything; teachers edit the jobs they provide.
    pub fn can_edit(&self, job: &JobDetails) -> bool {
        self.is_admin()
            || (self.has_role(Role::Teacher) && job.providers.iter().any(|p| p.id == self.user.id))
    }

    pub fn can_apply(&self) -> bool {
        self.has_role(Role::Student) && !self.is_admin()
    }
}
