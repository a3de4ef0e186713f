use tracing::{info, warn};

use crate::client::TrackingBackend;
use crate::error::AppError;
use crate::models::session::{Credentials, Session};

/// Logs in against the backend. The returned role decides which view runs.
pub async fn login(
    backend: &dyn TrackingBackend,
    email: &str,
    password: &str,
) -> Result<Session, AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Unauthorized(
            "Por favor, completa todos los campos".to_string(),
        ));
    }

    let credentials = Credentials {
        email: email.trim().to_string(),
        password: password.to_string(),
    };

    match backend.login(&credentials).await {
        Ok(session) => {
            info!(user_id = session.user.id, role = ?session.user.role, "login succeeded");
            Ok(session)
        }
        Err(err) => {
            warn!(error = %err, "login failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::login;
    use crate::error::AppError;
    use crate::models::session::Role;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn role_comes_from_the_backend() {
        let backend = FakeBackend::default();

        let admin = login(&backend, "admin@delivery.com", "admin123").await.unwrap();
        let courier = login(&backend, " juan@delivery.com ", "juan123").await.unwrap();

        assert_eq!(admin.role(), Role::Admin);
        assert_eq!(courier.role(), Role::Delivery);
        assert_eq!(courier.user.id, 7);
    }

    #[tokio::test]
    async fn blank_fields_and_bad_credentials_are_rejected() {
        let backend = FakeBackend::default();

        assert!(matches!(
            login(&backend, "", "x").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            login(&backend, "nobody@delivery.com", "x").await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
