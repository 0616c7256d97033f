//! REST client and the REST-backed [`ResourceApi`]
//!
//! Every request resolves a token according to its [`TokenRequirement`],
//! sends JSON, and folds the answer through [`normalize`]. A 401 answer
//! triggers one token refresh and one retry; when the refresh fails the
//! stored credentials are cleared.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use indexmap::IndexMap;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde_json::{Value, json};
use url::Url;

use crate::client::auth::{Credentials, Token, TokenRefresher};
use crate::client::response::{ApiResponse, normalize};
use crate::config::{ApiConfig, EndpointConfig, HttpMethod, ResourceConfig, TokenRequirement};
use crate::core::error::{ApiError, ConfigError, ResourceError, TabulaResult};
use crate::core::service::ResourceApi;
use crate::core::value::truthy;

/// Placeholder of the item id in endpoint paths
pub const ID_PLACEHOLDER: &str = "{%}";

const NETWORK_ERROR_MESSAGE: &str = "Network error: Please check your internet connection";
const NO_TOKEN_MESSAGE: &str = "No authentication token available";
const EXPIRED_TOKEN_MESSAGE: &str = "Authentication token has expired. Please login again.";

/// Lifetime given to tokens issued by a login without expiry
const LOGIN_TOKEN_HOURS: i64 = 24;

impl HttpMethod {
    /// Credentials a request of this method needs unless configured
    pub fn default_token_requirement(&self) -> TokenRequirement {
        match self {
            HttpMethod::Get | HttpMethod::Put => TokenRequirement::Optional,
            HttpMethod::Post => TokenRequirement::Required,
            HttpMethod::Delete => TokenRequirement::RequiredAuth,
        }
    }

    /// Whether an expired auth token is refreshed before sending
    pub fn refreshes_on_expire(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

fn token_error(token: &Option<Token>, requirement: TokenRequirement) -> Option<ApiResponse> {
    let required = matches!(
        requirement,
        TokenRequirement::Required | TokenRequirement::RequiredAuth
    );
    (required && token.is_none()).then(|| ApiResponse::failure("AUTH_ERROR", NO_TOKEN_MESSAGE, 0))
}

/// JSON client of one REST backend
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Absolute URL of `path`, with the id placeholder and query filled in
    pub fn url(&self, path: &str, id: Option<&str>, query: &IndexMap<String, String>) -> TabulaResult<Url> {
        let mut raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(id) = id {
            raw = raw.replace(ID_PLACEHOLDER, id);
        }
        let mut url = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            field: "api.baseUrl".to_string(),
            value: raw.clone(),
            message: e.to_string(),
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: &Url,
        body: Option<&Value>,
        token: Option<&Token>,
    ) -> Result<(u16, String), ApiError> {
        let mut request = self
            .http
            .request(method.to_reqwest(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if method == HttpMethod::Get {
            request = request.header(CACHE_CONTROL, "no-store");
        }
        if let Some(token) = token {
            request = request.bearer_auth(&token.token);
        }
        if let Some(body) = body.filter(|_| matches!(method, HttpMethod::Post | HttpMethod::Put)) {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%url, error = %e, "request failed");
            ApiError::Network {
                message: NETWORK_ERROR_MESSAGE.to_string(),
            }
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(method = method.as_str(), %url, status, "response received");
        Ok((status, text))
    }

    /// Perform a request and normalize its answer
    ///
    /// Without an explicit requirement the method's default applies.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: Url,
        body: Option<&Value>,
        requirement: Option<TokenRequirement>,
        camel_case_keys: bool,
    ) -> ApiResponse {
        let requirement = requirement.unwrap_or_else(|| method.default_token_requirement());

        let mut token = self.credentials.resolve(requirement);
        if let Some(error) = token_error(&token, requirement) {
            return error;
        }

        let expired = token
            .as_ref()
            .is_some_and(|t| !t.is_valid_at(Utc::now()) && self.credentials.auth_token().as_ref() == Some(t));
        if expired {
            if !method.refreshes_on_expire() || !self.credentials.refresh().await {
                return ApiResponse::failure("AUTH_ERROR", EXPIRED_TOKEN_MESSAGE, 0);
            }
            token = self.credentials.resolve(requirement);
            if let Some(error) = token_error(&token, requirement) {
                return error;
            }
        }

        let mut retried = false;
        loop {
            let (status, text) = match self.send(method, &url, body, token.as_ref()).await {
                Ok(answer) => answer,
                Err(e) => return ApiResponse::from_error(&e),
            };

            if status == 401 && requirement != TokenRequirement::Skip && !retried {
                retried = true;
                if self.credentials.refresh().await {
                    tracing::debug!(%url, "retrying after token refresh");
                    token = self.credentials.resolve(requirement);
                    continue;
                }
                self.credentials.logout();
            }

            if status == 204 {
                return ApiResponse {
                    http_status: status,
                    ..ApiResponse::ok(Value::Null)
                };
            }
            return normalize(status, &text, camel_case_keys);
        }
    }

    pub async fn get(&self, path: &str) -> ApiResponse {
        self.simple(HttpMethod::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> ApiResponse {
        self.simple(HttpMethod::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> ApiResponse {
        self.simple(HttpMethod::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResponse {
        self.simple(HttpMethod::Delete, path, None).await
    }

    async fn simple(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> ApiResponse {
        match self.url(path, None, &IndexMap::new()) {
            Ok(url) => self.request(method, url, body, None, false).await,
            Err(e) => ApiResponse::failure("HTTP_ERROR", e.to_string(), 0),
        }
    }

    /// Log in and store the issued auth token
    ///
    /// Accepts either a token envelope (`token`, `expires_at`) or a user
    /// payload carrying `_id`, `username` and `token`, whose token is given
    /// a 24 hour lifetime.
    pub async fn login(&self, path: &str, body: &Value) -> TabulaResult<Token> {
        let url = self.url(path, None, &IndexMap::new())?;
        let (status, text) = self.send(HttpMethod::Post, &url, Some(body), None).await?;
        if status == 401 {
            return Err(ApiError::Auth {
                message: "Authentication failed - please login again".to_string(),
            }
            .into());
        }

        let data = normalize(status, &text, false).into_result()?;
        let is_user_payload = ["_id", "username", "token"]
            .iter()
            .all(|key| data.get(*key).is_some_and(truthy));
        let token = if is_user_payload {
            let value = data.get("token").and_then(Value::as_str).unwrap_or_default();
            Token::new(value, Utc::now() + Duration::hours(LOGIN_TOKEN_HOURS))
        } else {
            serde_json::from_value(data)?
        };

        self.credentials.set_auth_token(token.clone());
        tracing::info!("logged in");
        Ok(token)
    }

    /// Refresher exchanging tokens at `path` of this backend
    pub fn refresher(&self, path: &str) -> TabulaResult<RestTokenRefresher> {
        Ok(RestTokenRefresher {
            http: self.http.clone(),
            url: self.url(path, None, &IndexMap::new())?,
        })
    }
}

/// Refreshes tokens by posting the current one to a REST endpoint
#[derive(Debug, Clone)]
pub struct RestTokenRefresher {
    http: reqwest::Client,
    url: Url,
}

impl RestTokenRefresher {
    pub fn new(url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl TokenRefresher for RestTokenRefresher {
    async fn refresh(&self, current: &Token) -> TabulaResult<Token> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&current.token)
            .json(&json!({ "token": current.token }))
            .send()
            .await
            .map_err(|_| ApiError::Network {
                message: NETWORK_ERROR_MESSAGE.to_string(),
            })?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let data = normalize(status, &text, false).into_result()?;
        Ok(serde_json::from_value(data)?)
    }
}

/// [`ResourceApi`] over the REST endpoints of a resource
#[derive(Debug, Clone)]
pub struct RestResourceApi {
    resource: String,
    client: RestClient,
    api: ApiConfig,
}

impl RestResourceApi {
    pub fn new(resource: impl Into<String>, api: ApiConfig, credentials: Credentials) -> Self {
        Self {
            resource: resource.into(),
            client: RestClient::new(api.base_url.clone(), credentials),
            api,
        }
    }

    /// Build from a resource configuration; the resource must declare an `api`
    pub fn from_config(config: &ResourceConfig, credentials: Credentials) -> TabulaResult<Self> {
        let api = config.api.clone().ok_or_else(|| ConfigError::InvalidValue {
            field: format!("{}.api", config.id),
            value: String::new(),
            message: "resource has no REST API configured".to_string(),
        })?;
        Ok(Self::new(config.id.clone(), api, credentials))
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    async fn call(
        &self,
        endpoint: &EndpointConfig,
        default_method: HttpMethod,
        id: Option<&str>,
        body: Option<&Value>,
        query: &IndexMap<String, String>,
    ) -> TabulaResult<Value> {
        let method = endpoint.method.unwrap_or(default_method);
        let url = self.client.url(&endpoint.path, id, query)?;
        let response = self
            .client
            .request(method, url, body, endpoint.token, self.api.camel_case_keys)
            .await;
        Ok(response.into_result()?)
    }

    fn endpoint(&self, endpoint: Option<&EndpointConfig>, operation: &str) -> TabulaResult<EndpointConfig> {
        endpoint.cloned().ok_or_else(|| {
            ResourceError::OperationNotSupported {
                resource: self.resource.clone(),
                operation: operation.to_string(),
            }
            .into()
        })
    }

    fn extract_list(&self, data: Value) -> TabulaResult<Vec<Value>> {
        if let Value::Array(items) = data {
            return Ok(items);
        }
        let keys = self.api.list_key.iter().map(String::as_str).chain(["data", "items"]);
        for key in keys {
            if let Some(Value::Array(items)) = data.get(key) {
                return Ok(items.clone());
            }
        }
        Err(ApiError::Parse {
            message: format!("Expected a list of {} items", self.resource),
        }
        .into())
    }
}

#[async_trait]
impl ResourceApi for RestResourceApi {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn fetch_list(&self) -> TabulaResult<Vec<Value>> {
        let data = self
            .call(&self.api.list, HttpMethod::Get, None, None, &self.api.query)
            .await?;
        self.extract_list(data)
    }

    async fn create(&self, item: Value) -> TabulaResult<Value> {
        let endpoint = self.endpoint(self.api.create.as_ref(), "create")?;
        self.call(&endpoint, HttpMethod::Post, None, Some(&item), &IndexMap::new())
            .await
    }

    async fn update(&self, id: &str, item: Value) -> TabulaResult<Value> {
        let endpoint = self.endpoint(self.api.update.as_ref(), "update")?;
        self.call(&endpoint, HttpMethod::Put, Some(id), Some(&item), &IndexMap::new())
            .await
    }

    async fn delete(&self, id: &str) -> TabulaResult<()> {
        let endpoint = self.endpoint(self.api.delete.as_ref(), "delete")?;
        self.call(&endpoint, HttpMethod::Delete, Some(id), None, &IndexMap::new())
            .await?;
        Ok(())
    }
}
