use bcrypt::{hash, verify};
use log::error;

use crate::error_handling::types::AuthError;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
// Lowest cost bcrypt accepts.
#[cfg(test)]
const HASH_COST: u32 = 4;

/// bcrypt hash of `password`, computed on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash(password, HASH_COST))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            AuthError::Hashing(e.to_string())
        })
}

/// Whether `password` matches `password_hash`. Malformed hashes never match.
pub async fn verify_password(password: &str, password_hash: &str) -> bool {
    let (password, password_hash) = (password.to_string(), password_hash.to_string());
    tokio::task::spawn_blocking(move || verify(password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hashed = hash_password("s3cret").await.unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed).await);
        assert!(!verify_password("other", &hashed).await);
    }

    #[tokio::test]
    async fn test_tests_hash_at_the_lowest_cost() {
        let hashed = hash_password("s3cret").await.unwrap();
        assert!(hashed.starts_with("$2b$04$"), "unexpected hash {}", hashed);
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!tokio_test::block_on(verify_password("anything", "not-a-hash")));
    }
}
