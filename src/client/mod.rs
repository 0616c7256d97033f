//! HTTP collaborator: REST requests, credentials and response handling

pub mod auth;
pub mod response;
pub mod rest;

pub use auth::{Credentials, InMemoryTokenStore, Token, TokenRefresher, TokenStore};
pub use response::{ApiInfo, ApiMessage, ApiResponse, normalize};
pub use rest::{RestClient, RestResourceApi, RestTokenRefresher};
