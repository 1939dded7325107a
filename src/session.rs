// Authenticated session. Created by logging in or registering, handed to
// every call that needs the token, ended by `logout`.

use std::fmt;
use tracing::info;

use crate::api::{ApiError, BookingApi};
use crate::payloads::{AuthResponse, Credentials, Registration, User};

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    user: User,
    token: String,
}

impl Session {
    pub async fn login(api: &dyn BookingApi, credentials: &Credentials) -> Result<Self, ApiError> {
        let session = Self::from_response(api.login(credentials).await?)?;
        info!(user = session.user.id, "logged in");
        Ok(session)
    }

    pub async fn register(
        api: &dyn BookingApi,
        registration: &Registration,
    ) -> Result<Self, ApiError> {
        let session = Self::from_response(api.register(registration).await?)?;
        info!(user = session.user.id, "registered");
        Ok(session)
    }

    // Resume a session whose token was obtained elsewhere
    pub fn from_parts(user: User, token: String) -> Self {
        Self { user, token }
    }

    fn from_response(response: AuthResponse) -> Result<Self, ApiError> {
        let token = response
            .token()
            .map(str::to_string)
            .ok_or_else(|| ApiError::DecodeError("auth response carries no token".to_string()))?;
        let user = response
            .into_user()
            .ok_or_else(|| ApiError::DecodeError("auth response carries no user".to_string()))?;
        Ok(Self { user, token })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    pub fn logout(self) {
        info!(user = self.user.id, "logged out");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_server::MockBackend;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_login_creates_session() {
        let backend = MockBackend::new();
        backend.add_user(7, "ana@example.com", "secret");

        let session = assert_ok!(
            Session::login(&backend, &Credentials::new("ana@example.com", "secret")).await
        );
        assert_eq!(session.user().id, 7);
        assert_eq!(session.authorization(), "Token token-7");
        assert!(!format!("{:?}", session).contains("token-7"));
        session.logout();
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let backend = MockBackend::new();
        backend.add_user(7, "ana@example.com", "secret");

        let error = assert_err!(
            Session::login(&backend, &Credentials::new("ana@example.com", "nope")).await
        );
        assert!(matches!(error, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_register_accepts_key_field() {
        let backend = MockBackend::new();
        let registration = Registration {
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            password: "pw".to_string(),
        };

        let session = assert_ok!(Session::register(&backend, &registration).await);
        assert_eq!(session.user().email, "bob@example.com");
        assert_eq!(session.token(), format!("token-{}", session.user().id));

        // the backend now knows the account under its email
        assert_ok!(Session::login(&backend, &Credentials::new("bob@example.com", "pw")).await);
    }

    #[test]
    fn test_response_without_token_is_rejected() {
        let response = AuthResponse {
            user: Some(User::default()),
            ..Default::default()
        };
        assert!(matches!(
            Session::from_response(response),
            Err(ApiError::DecodeError(_))
        ));
    }
}
