// file: src/api.rs
// description: REST client for the Task Master backend with uniform failure conversion

use crate::{
    config::ApiConfig,
    credentials::CredentialStore,
    error::{ApiError, GENERIC_FAILURE, TaskMasterError},
    monitoring,
    tasks::TaskQuery,
    types::{
        Credentials, Identity, LogEntry, LoginResponse, NewAccount, NewTask,
        PersistedNotification, ProfileResponse, Stats, Task, TaskUpdate, User, UserUpdate,
    },
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// How a 401 on this call should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unauthorized {
    BadCredentials,
    SessionExpired,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, TaskMasterError> {
        if config.base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(concat!("task-master-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            credentials,
        })
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials.load()
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(segments));
        match self.credentials.load() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        unauthorized: Unauthorized,
    ) -> Result<Vec<u8>, ApiError> {
        let response = builder.send().await.map_err(|e| {
            warn!("Request failed without response: {}", e);
            monitoring::API_ERRORS_COUNTER.increment(1);
            ApiError::Network
        })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read response body from {}: {}", url, e);
            ApiError::Network
        })?;
        debug!("{} -> {}", url, status);

        if status.is_success() {
            return Ok(body.to_vec());
        }

        monitoring::API_ERRORS_COUNTER.increment(1);
        Err(self.convert_failure(status, &body, unauthorized))
    }

    /// The single place where backend failures become [`ApiError`]s.
    fn convert_failure(
        &self,
        status: StatusCode,
        body: &[u8],
        unauthorized: Unauthorized,
    ) -> ApiError {
        let server_message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty());

        match status {
            StatusCode::UNAUTHORIZED if unauthorized == Unauthorized::BadCredentials => {
                ApiError::Auth {
                    message: server_message.unwrap_or_else(|| INVALID_CREDENTIALS.to_string()),
                }
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Backend rejected credential, clearing stored token");
                self.credentials.clear();
                ApiError::SessionExpired
            }
            _ => {
                let message = server_message.unwrap_or_else(|| GENERIC_FAILURE.to_string());
                match status {
                    StatusCode::NOT_FOUND => ApiError::NotFound { message },
                    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                        ApiError::Validation { message }
                    }
                    _ => ApiError::Server {
                        status: Some(status.as_u16()),
                        message,
                    },
                }
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(builder, Unauthorized::SessionExpired).await?;
        decode(&body)
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ApiError> {
        self.execute(
            self.request(method, segments).json(body),
            Unauthorized::SessionExpired,
        )
        .await
        .map(|_| ())
    }

    // auth

    /// Exchanges credentials for an access token and stores it.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, &["auth", "login"])
            .json(&Credentials { email, password });
        let body = self.execute(builder, Unauthorized::BadCredentials).await?;
        let response: LoginResponse = decode(&body)?;

        self.credentials
            .save(&response.access_token)
            .map_err(|e| ApiError::Server {
                status: None,
                message: e.to_string(),
            })
    }

    pub async fn register(&self, account: &NewAccount) -> Result<(), ApiError> {
        let builder = self.request(Method::POST, &["auth", "register"]).json(account);
        self.execute(builder, Unauthorized::BadCredentials)
            .await
            .map(|_| ())
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::POST, &["auth", "logout"]),
            Unauthorized::SessionExpired,
        )
        .await
        .map(|_| ())
    }

    pub async fn profile(&self) -> Result<Option<Identity>, ApiError> {
        let profile: ProfileResponse = self
            .fetch(self.request(Method::GET, &["users", "profile"]))
            .await?;
        Ok(profile.user)
    }

    // tasks

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.fetch(
            self.request(Method::GET, &["tasks"])
                .query(&query.to_params()),
        )
        .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, ApiError> {
        self.fetch(self.request(Method::GET, &["tasks", id])).await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<(), ApiError> {
        self.send_json(Method::POST, &["tasks"], task).await
    }

    pub async fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<(), ApiError> {
        self.send_json(Method::PUT, &["tasks", id], update).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::DELETE, &["tasks", id]),
            Unauthorized::SessionExpired,
        )
        .await
        .map(|_| ())
    }

    // users

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.fetch(self.request(Method::GET, &["users"])).await
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), ApiError> {
        self.send_json(Method::PUT, &["users", id], update).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::DELETE, &["users", id]),
            Unauthorized::SessionExpired,
        )
        .await
        .map(|_| ())
    }

    // analytics and logs

    pub async fn stats(&self, user_id: &str) -> Result<Stats, ApiError> {
        self.fetch(self.request(Method::GET, &["analytics", "stats", user_id]))
            .await
    }

    pub async fn logs(&self, identity: &Identity) -> Result<Vec<LogEntry>, ApiError> {
        self.fetch(self.request(Method::GET, &["logs"]).query(&[
            ("role", identity.role.as_str()),
            ("_id", identity.id.as_str()),
        ]))
        .await
    }

    // notifications

    pub async fn notifications(&self) -> Result<Vec<PersistedNotification>, ApiError> {
        self.fetch(self.request(Method::GET, &["notifications"]))
            .await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &["notifications", id, "read"]),
            Unauthorized::SessionExpired,
        )
        .await
        .map(|_| ())
    }
}

/// Decodes a success body, treating an unexpected shape as a server fault.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Unexpected response shape: {}", e);
        ApiError::Server {
            status: None,
            message: GENERIC_FAILURE.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use std::time::Duration;

    fn client(base: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: Url::parse(base).unwrap(),
            timeout: Duration::from_secs(5),
        };
        ApiClient::new(&config, Arc::new(MemoryCredentialStore::default())).unwrap()
    }

    #[test]
    fn endpoints_extend_the_base_path() {
        let api = client("http://localhost:5000/api");
        assert_eq!(
            api.endpoint(&["notifications", "n1", "read"]).as_str(),
            "http://localhost:5000/api/notifications/n1/read"
        );

        let trailing = client("http://localhost:5000/api/");
        assert_eq!(
            trailing.endpoint(&["tasks"]).as_str(),
            "http://localhost:5000/api/tasks"
        );
    }

    #[test]
    fn failure_conversion_follows_status() {
        let api = client("http://localhost:5000/api");
        api.credentials.save("tok").unwrap();

        let not_found = api.convert_failure(
            StatusCode::NOT_FOUND,
            br#"{"message":"Task not found"}"#,
            Unauthorized::SessionExpired,
        );
        assert_eq!(
            not_found,
            ApiError::NotFound {
                message: "Task not found".into()
            }
        );

        let server = api.convert_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"",
            Unauthorized::SessionExpired,
        );
        assert_eq!(server.message(), GENERIC_FAILURE);

        let bad_login = api.convert_failure(StatusCode::UNAUTHORIZED, b"", Unauthorized::BadCredentials);
        assert_eq!(bad_login.message(), INVALID_CREDENTIALS);
        assert_eq!(api.access_token().as_deref(), Some("tok"));

        let expired = api.convert_failure(StatusCode::UNAUTHORIZED, b"", Unauthorized::SessionExpired);
        assert_eq!(expired, ApiError::SessionExpired);
        assert_eq!(api.access_token(), None);
    }

    #[test]
    fn cannot_be_a_base_urls_are_rejected() {
        let config = ApiConfig {
            base_url: Url::parse("mailto:ops@example.com").unwrap(),
            timeout: Duration::from_secs(5),
        };
        assert!(ApiClient::new(&config, Arc::new(MemoryCredentialStore::default())).is_err());
    }
}
