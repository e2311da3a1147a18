//! Property service client (booking service → property service).

use reqwest::Client;
use url::Url;

use super::{ClientError, default_http_client, expect_success, parse_response};
use crate::objects::calendar::{
    BookedByQuery, BookedByResponse, CommitDatesRequest, LockDatesRequest, LockDatesResponse,
    ReleaseDatesRequest, UnbookDatesRequest,
};
use crate::objects::property::PropertySnapshot;

/// Typed HTTP client for the property service's internal calendar API.
///
/// Error statuses are passed through untouched in [`ClientError::Api`]:
/// `409` means the dates are taken, `410` means the lock token is invalid
/// or expired, `404` means the property is unknown.
#[derive(Debug, Clone)]
pub struct PropertyClient {
    http: Client,
    base_url: Url,
}

impl PropertyClient {
    /// Create a new `PropertyClient` rooted at `base_url`.
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

    /// `GET /properties/{property_id}/snapshot`
    pub async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/snapshot"))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `POST /properties/{property_id}/availability/lock`
    pub async fn lock(
        &self,
        property_id: i64,
        body: &LockDatesRequest,
    ) -> Result<LockDatesResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/availability/lock"))?;
        let resp = self.http.post(url).json(body).send().await?;
        parse_response(resp).await
    }

    /// `POST /properties/{property_id}/availability/commit`
    pub async fn commit(
        &self,
        property_id: i64,
        body: &CommitDatesRequest,
    ) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/availability/commit"))?;
        let resp = self.http.post(url).json(body).send().await?;
        expect_success(resp).await
    }

    /// `POST /properties/{property_id}/availability/release`
    pub async fn release(
        &self,
        property_id: i64,
        body: &ReleaseDatesRequest,
    ) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/availability/release"))?;
        let resp = self.http.post(url).json(body).send().await?;
        expect_success(resp).await
    }

    /// `POST /properties/{property_id}/availability/unbook`
    pub async fn unbook(
        &self,
        property_id: i64,
        body: &UnbookDatesRequest,
    ) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/availability/unbook"))?;
        let resp = self.http.post(url).json(body).send().await?;
        expect_success(resp).await
    }

    /// `GET /properties/{property_id}/availability/booked-by`
    pub async fn booked_by(
        &self,
        property_id: i64,
        query: &BookedByQuery,
    ) -> Result<BookedByResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/properties/{property_id}/availability/booked-by"))?;
        let resp = self.http.get(url).query(query).send().await?;
        parse_response(resp).await
    }
}
