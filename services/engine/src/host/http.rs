//! HTTP host management client.

use std::time::Duration;

use async_trait::async_trait;
use hostpool_id::{ServiceId, UserId};
use serde::Serialize;
use tracing::{debug, error};

use super::{HostError, HostManagementClient};
use crate::model::{Server, Service, Specs};

/// Body sent with a provisioning request.
#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    service_id: ServiceId,
    user_id: UserId,
    name: &'a str,
    specs: Specs,
}

/// Talks to each server's management API at `provider.api_endpoint`.
#[derive(Debug, Clone)]
pub struct HttpHostClient {
    client: reqwest::Client,
}

impl HttpHostClient {
    /// Build a client whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    fn service_url(server: &Server, service: &Service, action: &str) -> String {
        format!(
            "{}/services/{}/{}",
            server.provider.api_endpoint.trim_end_matches('/'),
            service.id,
            action
        )
    }
}

fn transport_error(err: reqwest::Error) -> HostError {
    if err.is_timeout() {
        HostError::Timeout
    } else {
        HostError::Unreachable(err.to_string())
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<(), HostError> {
    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, "Host refused {what}");
    Err(HostError::Rejected(format!("{what}: {status} - {body}")))
}

#[async_trait]
impl HostManagementClient for HttpHostClient {
    async fn begin_provisioning(
        &self,
        server: &Server,
        service: &Service,
    ) -> Result<(), HostError> {
        let url = Self::service_url(server, service, "provision");
        debug!(url = %url, service_id = %service.id, "Requesting provisioning");

        let body = ProvisionRequest {
            service_id: service.id,
            user_id: service.user,
            name: &service.name,
            specs: service.specs,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response, "provisioning").await
    }

    async fn deprovision(&self, server: &Server, service: &Service) -> Result<(), HostError> {
        let url = Self::service_url(server, service, "deprovision");
        debug!(url = %url, service_id = %service.id, "Requesting deprovisioning");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response, "deprovisioning").await
    }

    async fn is_available(&self, server: &Server) -> Result<bool, HostError> {
        let url = format!(
            "{}/health",
            server.provider.api_endpoint.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        debug!(server_id = %server.id, status = %response.status(), "Health probe");
        Ok(response.status().is_success())
    }
}
