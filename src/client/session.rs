use crate::common::models::{CurrentUser, UserId};

/// Who is talking to the backend. Passed explicitly to the API client and
/// the connection manager instead of living in globals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub auth_token: Option<String>,
    pub user: Option<CurrentUser>,
}

impl SessionContext {
    pub fn new(auth_token: Option<String>) -> Self {
        Self { auth_token, user: None }
    }

    pub fn with_user(mut self, user: Option<CurrentUser>) -> Self {
        self.user = user;
        self
    }

    pub fn bearer(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}
