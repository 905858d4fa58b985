//! Packet API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::models::{
    ApiErrorBody, CreateDeviceBody, DeviceList, DeviceResource, UpdateDeviceBody,
};
use crate::providers::traits::{
    ApiError, CreateDeviceRequest, DeviceApi, DeviceRecord, DeviceStatus, IpAssignment,
    UpdateDeviceRequest,
};

/// Base URL for the Packet API.
pub const API_BASE_URL: &str = "https://api.packet.net";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size when listing devices.
const PER_PAGE: u32 = 100;

/// Packet bare metal device API.
#[derive(Clone)]
pub struct PacketClient {
    /// HTTP client.
    client: Client,
    /// API token for authentication.
    auth_token: String,
    /// API root, without trailing slash.
    base_url: String,
}

impl std::fmt::Debug for PacketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PacketClient {
    /// Create a client against the public Packet API.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(auth_token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_base_url(auth_token, API_BASE_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a client against a specific API root.
    ///
    /// # Errors
    /// Returns error if the token is empty or the HTTP client cannot be created.
    pub fn with_base_url(
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
        request_timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let auth_token = auth_token.into();
        if auth_token.is_empty() {
            return Err(ApiError::Config("auth token must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            auth_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated request with a JSON body.
    async fn send_json<T, B>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, method = %method, "JSON request");

        let response = self
            .client
            .request(method, &url)
            .header("X-Auth-Token", &self.auth_token)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated DELETE request.
    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(&url)
            .header("X-Auth-Token", &self.auth_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Self::error_for(status, &text))
        }
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ApiError::Serialization(e)
            })
        } else {
            Err(Self::error_for(status, &text))
        }
    }

    /// Map a non-success status and body onto an [`ApiError`].
    fn error_for(status: StatusCode, text: &str) -> ApiError {
        let message = serde_json::from_str::<ApiErrorBody>(text)
            .ok()
            .filter(|body| !body.errors.is_empty())
            .map_or_else(|| text.to_string(), |body| body.errors.join("; "));

        if status == StatusCode::NOT_FOUND {
            ApiError::NotFound(message)
        } else {
            ApiError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Convert API device resource to our record type.
    fn to_record(resource: DeviceResource) -> DeviceRecord {
        let parse_time = |s: Option<String>| {
            s.as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc))
        };

        DeviceRecord {
            state: DeviceStatus::from_api(&resource.state),
            root_password: resource.root_password.filter(|p| !p.is_empty()),
            plan: resource.plan.map(|p| p.slug).unwrap_or_default(),
            facility: resource.facility.map(|f| f.code).unwrap_or_default(),
            operating_system: resource
                .operating_system
                .map(|os| os.slug)
                .unwrap_or_default(),
            billing_cycle: resource.billing_cycle.unwrap_or_default(),
            project_id: resource
                .project
                .as_ref()
                .map(super::models::Href::resolve_id)
                .unwrap_or_default(),
            ip_addresses: resource
                .ip_addresses
                .into_iter()
                .map(|ip| IpAssignment {
                    address: ip.address,
                    address_family: ip.address_family,
                    public: ip.public,
                    cidr: ip.cidr,
                })
                .collect(),
            ipxe_script_url: resource.ipxe_script_url.filter(|u| !u.is_empty()),
            always_pxe: resource.always_pxe,
            user_data: resource.userdata.filter(|u| !u.is_empty()),
            tags: resource.tags,
            locked: resource.locked,
            description: resource.description,
            created_at: parse_time(resource.created_at),
            updated_at: parse_time(resource.updated_at),
            id: resource.id,
            hostname: resource.hostname,
        }
    }
}

#[async_trait]
impl DeviceApi for PacketClient {
    async fn create_device(&self, req: &CreateDeviceRequest) -> Result<DeviceRecord, ApiError> {
        info!(
            hostname = %req.hostname,
            plan = %req.plan,
            facility = %req.facility,
            operating_system = %req.operating_system,
            "Creating device"
        );

        let body = CreateDeviceBody {
            hostname: req.hostname.clone(),
            plan: req.plan.clone(),
            facility: req.facility.clone(),
            operating_system: req.operating_system.clone(),
            billing_cycle: req.billing_cycle.to_string(),
            project_id: req.project_id.clone(),
            public_ipv4_subnet_size: req.public_ipv4_subnet_size,
            ipxe_script_url: req.ipxe_script_url.clone(),
            always_pxe: req.always_pxe,
            userdata: req.user_data.clone(),
            tags: req.tags.clone(),
            locked: req.locked,
            description: req.description.clone(),
        };

        let resource: DeviceResource = self
            .send_json(
                reqwest::Method::POST,
                &format!("/projects/{}/devices", req.project_id),
                &body,
            )
            .await?;
        let device = Self::to_record(resource);

        info!(device_id = %device.id, state = %device.state, "Device submitted");
        Ok(device)
    }

    async fn get_device(&self, id: &str) -> Result<DeviceRecord, ApiError> {
        let resource: DeviceResource = self.get(&format!("/devices/{id}")).await?;
        Ok(Self::to_record(resource))
    }

    async fn update_device(
        &self,
        id: &str,
        req: &UpdateDeviceRequest,
    ) -> Result<DeviceRecord, ApiError> {
        info!(device_id = %id, "Updating device");

        let body = UpdateDeviceBody {
            hostname: req.hostname.clone(),
            userdata: req.user_data.clone(),
            ipxe_script_url: req.ipxe_script_url.clone(),
            always_pxe: req.always_pxe,
            tags: req.tags.clone(),
            locked: req.locked,
            description: req.description.clone(),
        };

        let resource: DeviceResource = self
            .send_json(reqwest::Method::PUT, &format!("/devices/{id}"), &body)
            .await?;
        Ok(Self::to_record(resource))
    }

    async fn delete_device(&self, id: &str) -> Result<(), ApiError> {
        info!(device_id = %id, "Deleting device");
        self.delete(&format!("/devices/{id}")).await
    }

    async fn list_project_devices(&self, project_id: &str) -> Result<Vec<DeviceRecord>, ApiError> {
        let mut devices = Vec::new();
        let mut page = 1;

        loop {
            let list: DeviceList = self
                .get(&format!(
                    "/projects/{project_id}/devices?page={page}&per_page={PER_PAGE}"
                ))
                .await?;
            let fetched = list.devices.len();
            devices.extend(list.devices.into_iter().map(Self::to_record));

            // Count pages locally; `meta` is only trusted for the upper bound.
            let last_page = list.meta.last_page.unwrap_or(page);
            if fetched == 0 || page >= last_page {
                break;
            }
            page += 1;
        }

        debug!(project_id = %project_id, count = devices.len(), "Listed devices");
        Ok(devices)
    }
}
