use serde::{Deserialize, Serialize};

/// Signed-in user, as returned by the auth provider and persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub user_id: String,
    pub id_token: String,
    pub refresh_token: String,
}
