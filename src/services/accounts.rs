// src/services/accounts.rs

use crate::{
    config::Config, error::AppError, store::AdminDirectory, utils::hash::hash_password_blocking,
};

/// Create the bootstrap admin from `ADMIN_USERNAME` / `ADMIN_PASSWORD` if it does not exist yet.
///
/// Returns whether an account was created.
pub async fn seed_admin<S>(store: &S, config: &Config) -> Result<bool, AppError>
where
    S: AdminDirectory + ?Sized,
{
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password)
    else {
        return Ok(false);
    };

    if store.find_admin(username).await?.is_some() {
        return Ok(false);
    }

    tracing::info!("Seeding admin user: {}", username);
    let hashed_password = hash_password_blocking(password.clone()).await?;
    store.create_admin(username, &hashed_password).await?;
    tracing::info!("Admin user created successfully.");

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, utils::hash::verify_password};

    fn config_with_admin(username: Option<&str>, password: Option<&str>) -> Config {
        let mut config = Config::from_lookup(|key: &str| match key {
            "JWT_SECRET" => Some("test-secret".to_string()),
            "STORE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();
        config.admin_username = username.map(str::to_string);
        config.admin_password = password.map(str::to_string);
        config
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let store = MemoryStore::new();
        let config = config_with_admin(Some("principal"), Some("s3cret-pass"));

        assert!(seed_admin(&store, &config).await.unwrap());
        assert!(!seed_admin(&store, &config).await.unwrap());

        let admin = store.find_admin("principal").await.unwrap().unwrap();
        assert!(verify_password("s3cret-pass", &admin.password).unwrap());
    }

    #[tokio::test]
    async fn test_seed_admin_skipped_without_credentials() {
        let store = MemoryStore::new();
        let config = config_with_admin(Some("principal"), None);

        assert!(!seed_admin(&store, &config).await.unwrap());
        assert!(store.find_admin("principal").await.unwrap().is_none());
    }
}
