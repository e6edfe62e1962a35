use crate::api::ApiClient;
use crate::error::{Result, TodoError};
use crate::session::SessionStore;
use tracing::{info, warn};

pub const LOGIN_FALLBACK: &str = "Error while login";
pub const REGISTER_FALLBACK: &str = "Error while registering";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Owns the token's lifetime: installs it on the client at session start
/// and removes it from both the client and the store at logout.
pub struct Session {
    store: Box<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Restores a stored token. Returns whether a session is active.
    pub fn resume(&self, client: &mut ApiClient) -> Result<bool> {
        match self.store.load()? {
            Some(token) => {
                client.set_token(token);
                info!("resumed stored session");
                Ok(true)
            }
            None => {
                client.clear_token();
                Ok(false)
            }
        }
    }

    pub async fn login(&self, client: &mut ApiClient, form: &LoginForm) -> Result<()> {
        let token = client.login(form.email.trim(), &form.password).await?;
        self.begin(client, token)
    }

    pub async fn register(&self, client: &mut ApiClient, form: &RegisterForm) -> Result<()> {
        let token = client
            .register(form.name.trim(), form.email.trim(), &form.password)
            .await?;
        self.begin(client, token)
    }

    fn begin(&self, client: &mut ApiClient, token: String) -> Result<()> {
        self.store.save(&token)?;
        client.set_token(token);
        info!("session started");
        Ok(())
    }

    /// Ends the session. The client token is dropped even if the store
    /// cannot be cleared.
    pub fn logout(&self, client: &mut ApiClient) -> Result<()> {
        client.clear_token();
        let cleared = self.store.clear();
        if let Err(err) = &cleared {
            warn!(error = %err, "could not clear stored session");
        }
        info!("session ended");
        cleared
    }
}

/// Text shown under a login or register form after a failure.
pub fn inline_message(err: &TodoError, fallback: &str) -> String {
    err.server_message()
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
