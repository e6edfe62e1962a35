use crate::config::Config;
use crate::error::{Result, TodoError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::{json, Value};
use tracing::debug;

/// The task endpoints the dashboard depends on. Payloads come back raw and
/// are normalized by the caller.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// GET /tasks
    async fn fetch_tasks(&self) -> Result<Value>;

    /// POST /tasks
    async fn create_task(&self, title: &str, description: &str) -> Result<Value>;

    /// PUT /tasks/{id}
    async fn update_task(&self, task_id: &str, fields: &Value) -> Result<()>;

    /// DELETE /tasks/{id}
    async fn delete_task(&self, task_id: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/tasks/{id}` with the id as a single percent-encoded segment
    fn task_url(&self, task_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url("/tasks"))
            .map_err(|err| TodoError::Config(format!("invalid api_url: {}", err)))?;
        url.path_segments_mut()
            .map_err(|_| TodoError::Config(format!("api_url cannot take a path: {}", self.base_url)))?
            .push(task_id);
        Ok(url)
    }

    /// POST /auth/login, returning the issued token
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let builder = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }));
        let body: Value = self.send(builder).await?.json().await?;
        extract_token(&body)
    }

    /// POST /auth/register, returning the issued token
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String> {
        let builder = self.client.post(self.url("/auth/register")).json(&json!({
            "name": name,
            "email": email,
            "password": password,
        }));
        let body: Value = self.send(builder).await?.json().await?;
        extract_token(&body)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let builder = match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        };

        let res = builder.send().await?;
        let status = res.status();
        debug!(%status, url = %res.url(), "api response");

        if status.is_success() {
            Ok(res)
        } else {
            let error_text = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            debug!(%status, body = %error_text, "api error body");
            Err(TodoError::api_error(status, message))
        }
    }
}

#[async_trait]
impl TaskApi for ApiClient {
    async fn fetch_tasks(&self) -> Result<Value> {
        let builder = self.client.get(self.url("/tasks"));
        Ok(self.send(builder).await?.json().await?)
    }

    async fn create_task(&self, title: &str, description: &str) -> Result<Value> {
        let builder = self
            .client
            .post(self.url("/tasks"))
            .json(&json!({ "title": title, "description": description }));
        Ok(self.send(builder).await?.json().await?)
    }

    async fn update_task(&self, task_id: &str, fields: &Value) -> Result<()> {
        let builder = self
            .client
            .put(self.task_url(task_id)?)
            .json(fields);
        self.send(builder).await?;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        let builder = self.client.delete(self.task_url(task_id)?);
        self.send(builder).await?;
        Ok(())
    }
}

fn extract_token(body: &Value) -> Result<String> {
    body.get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TodoError::InvalidResponse("auth response without a token".to_string()))
}
