//! Device API trait and common types for bare metal device providers.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Device not found.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-checkable classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The addressed device does not exist.
    NotFound,
    /// Network noise or a server-side hiccup; the same call may succeed later.
    Transient,
    /// The API refused the request; repeating it will not help.
    Rejected,
}

impl ApiError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::NotFound(_) => ApiErrorKind::NotFound,
            Self::Http(e) if e.is_builder() => ApiErrorKind::Rejected,
            Self::Http(_) => ApiErrorKind::Transient,
            Self::Api { status, .. } if *status == 408 || *status == 429 || *status >= 500 => {
                ApiErrorKind::Transient
            }
            Self::Api { .. } | Self::Config(_) | Self::Serialization(_) => ApiErrorKind::Rejected,
        }
    }

    /// Whether the addressed device does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ApiErrorKind::NotFound
    }

    /// Whether the call may succeed if repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ApiErrorKind::Transient
    }
}

/// Device state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Accepted, waiting for hardware.
    Queued,
    /// Hardware assigned, OS being installed.
    Provisioning,
    /// Provisioned and usable.
    Active,
    /// Provisioning failed on the provider side.
    Failed,
    /// Powered down.
    Inactive,
    /// Power-on in progress.
    PoweringOn,
    /// Power-off in progress.
    PoweringOff,
    /// OS being reinstalled.
    Reinstalling,
    /// Being torn down.
    Deprovisioning,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Active => write!(f, "active"),
            Self::Failed => write!(f, "failed"),
            Self::Inactive => write!(f, "inactive"),
            Self::PoweringOn => write!(f, "powering_on"),
            Self::PoweringOff => write!(f, "powering_off"),
            Self::Reinstalling => write!(f, "reinstalling"),
            Self::Deprovisioning => write!(f, "deprovisioning"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl DeviceStatus {
    /// Parse a provider state string, mapping anything unrecognised to `Unknown`.
    #[must_use]
    pub fn from_api(state: &str) -> Self {
        match state {
            "queued" => Self::Queued,
            "provisioning" => Self::Provisioning,
            "active" => Self::Active,
            "failed" => Self::Failed,
            "inactive" => Self::Inactive,
            "powering_on" => Self::PoweringOn,
            "powering_off" => Self::PoweringOff,
            "reinstalling" => Self::Reinstalling,
            "deprovisioning" => Self::Deprovisioning,
            _ => Self::Unknown,
        }
    }
}

/// Billing cycle for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Every accepted billing cycle, in display order.
    pub const ALL: [Self; 5] = [
        Self::Hourly,
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
        Self::Yearly,
    ];

    /// API slug for this cycle.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known billing cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown billing cycle '{0}'")]
pub struct ParseBillingCycleError(pub String);

impl FromStr for BillingCycle {
    type Err = ParseBillingCycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cycle| cycle.as_str() == s)
            .ok_or_else(|| ParseBillingCycleError(s.to_string()))
    }
}

/// An IP address assigned to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAssignment {
    /// The address itself.
    pub address: String,
    /// 4 or 6.
    pub address_family: u8,
    /// Whether the address is publicly routable.
    pub public: bool,
    /// Prefix length of the allocation (e.g. 31 for a /31).
    pub cidr: u32,
}

/// A device as observed on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique device identifier, assigned by the provider.
    pub id: String,
    /// Device hostname.
    pub hostname: String,
    /// Current state.
    pub state: DeviceStatus,
    /// Root password; only present once provisioning completes.
    pub root_password: Option<String>,
    /// Plan slug.
    pub plan: String,
    /// Facility code.
    pub facility: String,
    /// Operating system slug.
    pub operating_system: String,
    /// Billing cycle slug as echoed by the API.
    pub billing_cycle: String,
    /// Owning project.
    pub project_id: String,
    /// IP allocations.
    pub ip_addresses: Vec<IpAssignment>,
    /// iPXE script URL, for `custom_ipxe` devices.
    pub ipxe_script_url: Option<String>,
    /// Whether the device network boots on every restart.
    pub always_pxe: bool,
    /// User data payload.
    pub user_data: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether the device is locked against deletion.
    pub locked: bool,
    /// Free-form description.
    pub description: Option<String>,
    /// When the device was created.
    pub created_at: Option<DateTime<Utc>>,
    /// When the device was last updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request to create a new device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeviceRequest {
    /// Hostname for the device.
    pub hostname: String,
    /// Plan slug (e.g., `baremetal_0`).
    pub plan: String,
    /// Facility code (e.g., `sjc1`).
    pub facility: String,
    /// Operating system slug (e.g., `ubuntu_16_04`).
    pub operating_system: String,
    /// Billing cycle.
    pub billing_cycle: BillingCycle,
    /// Project the device is created in.
    pub project_id: String,
    /// Requested public IPv4 prefix length; provider default when `None`.
    pub public_ipv4_subnet_size: Option<u32>,
    /// iPXE script URL.
    pub ipxe_script_url: Option<String>,
    /// Network boot on every restart.
    pub always_pxe: bool,
    /// User data payload.
    pub user_data: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Lock the device against deletion.
    pub locked: bool,
    /// Free-form description.
    pub description: Option<String>,
}

/// In-place changes to an existing device. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeviceRequest {
    pub hostname: Option<String>,
    pub user_data: Option<String>,
    pub ipxe_script_url: Option<String>,
    pub always_pxe: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub locked: Option<bool>,
    pub description: Option<String>,
}

impl UpdateDeviceRequest {
    /// Whether this request changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Trait for bare metal device APIs.
///
/// Implementations map transport failures onto [`ApiError`] so callers can
/// branch on [`ApiError::kind`].
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Submit a new device.
    async fn create_device(&self, req: &CreateDeviceRequest) -> Result<DeviceRecord, ApiError>;

    /// Get a device by ID.
    async fn get_device(&self, id: &str) -> Result<DeviceRecord, ApiError>;

    /// Apply in-place changes to a device.
    async fn update_device(
        &self,
        id: &str,
        req: &UpdateDeviceRequest,
    ) -> Result<DeviceRecord, ApiError>;

    /// Delete a device. Returns [`ApiError::NotFound`] when it is already gone.
    async fn delete_device(&self, id: &str) -> Result<(), ApiError>;

    /// List all devices in a project.
    async fn list_project_devices(&self, project_id: &str) -> Result<Vec<DeviceRecord>, ApiError>;
}
