/// Database row types that never cross the API boundary as-is.
/// Public documents (workspaces, members, messages, ...) map straight onto
/// `parley_types::models`.
use parley_types::models::User;

/// A user row including the password hash.
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub image: Option<String>,
    pub creation_time: i64,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            image: self.image,
            creation_time: self.creation_time,
        }
    }
}

/// Metadata for a stored blob. The bytes live on disk.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub creation_time: i64,
}
