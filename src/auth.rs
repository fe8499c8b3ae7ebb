//! In-process authentication service.
//!
//! Stands in for the hosted auth provider: email/password accounts with a
//! display name, one signed-in user at a time. Explicit dependency-injected
//! service with the same lifecycle as the application; the hosted provider
//! itself stays an external collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    EmailAlreadyRegistered,
    InvalidCredentials,
    NotSignedIn,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::EmailAlreadyRegistered => {
                write!(f, "An account with this email already exists")
            }
            AuthError::InvalidCredentials => {
                write!(f, "Login failed. Please check your credentials.")
            }
            AuthError::NotSignedIn => write!(f, "No user is signed in"),
        }
    }
}

impl std::error::Error for AuthError {}

struct Account {
    user: User,
    password: String,
}

struct AuthInner {
    accounts: HashMap<String, Account>,
    current: Option<User>,
}

/// Email/password registry plus the current session.
pub struct AuthService {
    inner: Mutex<AuthInner>,
}

impl AuthService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AuthInner {
                accounts: HashMap::new(),
                current: None,
            }),
        }
    }

    /// Create an account and sign the new user in.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let mut inner = self.lock();
        let key = email.to_ascii_lowercase();
        if inner.accounts.contains_key(&key) {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        inner.accounts.insert(
            key,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        inner.current = Some(user.clone());
        log::info!("Registered user {}", user.email);
        Ok(user)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let mut inner = self.lock();
        let key = email.to_ascii_lowercase();
        match inner.accounts.get(&key) {
            Some(account) if account.password == password => {
                let user = account.user.clone();
                inner.current = Some(user.clone());
                log::info!("User {} signed in", user.email);
                Ok(user)
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        let mut inner = self.lock();
        match inner.current.take() {
            Some(user) => {
                log::info!("User {} signed out", user.email);
                Ok(())
            }
            None => Err(AuthError::NotSignedIn),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().current.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthInner> {
        // A poisoned auth registry is unrecoverable; the service owns no
        // state worth salvaging past a panicked writer.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}
