use time::OffsetDateTime;

/// Registered user as kept by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub email: String,         // lowercased
    pub password_hash: String, // Argon2 PHC string
    pub created_at: OffsetDateTime,
}
