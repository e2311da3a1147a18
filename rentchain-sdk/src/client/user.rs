//! User service client (booking service → user service).

use reqwest::Client;
use url::Url;

use super::{ClientError, default_http_client, parse_response};
use crate::objects::user::TenantProfile;

/// Typed HTTP client for the user service's internal profile lookup.
#[derive(Debug, Clone)]
pub struct UserClient {
    http: Client,
    base_url: Url,
}

impl UserClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: default_http_client(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /internal/users/{user_id}`
    pub async fn tenant_profile(&self, user_id: i64) -> Result<TenantProfile, ClientError> {
        let url = self.base_url.join(&format!("/internal/users/{user_id}"))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }
}
