//! Desired and observed device attribute sets.
//!
//! [`DeviceSpec`] is what the caller asks for. [`DeviceState`] is the flat
//! attribute set cached locally for a device, rebuilt in full from every
//! [`DeviceRecord`] fetched from the provider.

use serde::{Deserialize, Serialize};

use crate::providers::{BillingCycle, CreateDeviceRequest, DeviceRecord, DeviceStatus};

/// Operating system slug that switches the device to a user-supplied iPXE boot.
pub const CUSTOM_IPXE: &str = "custom_ipxe";

/// Public IPv4 prefix length a device gets when none is requested.
pub const DEFAULT_PUBLIC_IPV4_SUBNET_SIZE: u32 = 31;

/// Public IPv4 prefix lengths the provider hands out.
pub const ALLOWED_PUBLIC_IPV4_SUBNET_SIZES: [u32; 4] = [31, 30, 29, 28];

/// Desired state of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Hostname.
    pub hostname: String,
    /// Plan slug (e.g., `baremetal_0`).
    pub plan: String,
    /// Facility code (e.g., `sjc1`).
    pub facility: String,
    /// Operating system slug, or [`CUSTOM_IPXE`].
    pub operating_system: String,
    /// Billing cycle slug (e.g., `hourly`).
    pub billing_cycle: String,
    /// Owning project; must already exist.
    pub project_id: String,
    /// Requested public IPv4 prefix length.
    #[serde(default)]
    pub public_ipv4_subnet_size: Option<u32>,
    /// iPXE script URL (custom iPXE only).
    #[serde(default)]
    pub ipxe_script_url: Option<String>,
    /// Network boot on every restart (custom iPXE only).
    #[serde(default)]
    pub always_pxe: bool,
    /// Opaque user data, e.g. cloud-init or an inline iPXE script.
    #[serde(default)]
    pub user_data: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Lock the device against deletion.
    #[serde(default)]
    pub locked: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl DeviceSpec {
    /// Create a spec with the required fields set and everything else defaulted.
    #[must_use]
    pub fn new(
        hostname: impl Into<String>,
        plan: impl Into<String>,
        facility: impl Into<String>,
        operating_system: impl Into<String>,
        billing_cycle: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            plan: plan.into(),
            facility: facility.into(),
            operating_system: operating_system.into(),
            billing_cycle: billing_cycle.into(),
            project_id: project_id.into(),
            public_ipv4_subnet_size: None,
            ipxe_script_url: None,
            always_pxe: false,
            user_data: None,
            tags: Vec::new(),
            locked: false,
            description: None,
        }
    }

    /// Request a public IPv4 prefix length.
    #[must_use]
    pub fn with_subnet_size(mut self, size: u32) -> Self {
        self.public_ipv4_subnet_size = Some(size);
        self
    }

    /// Set the iPXE script URL.
    #[must_use]
    pub fn with_ipxe_script_url(mut self, url: impl Into<String>) -> Self {
        self.ipxe_script_url = Some(url.into());
        self
    }

    /// Set the always-PXE flag.
    #[must_use]
    pub fn with_always_pxe(mut self, always_pxe: bool) -> Self {
        self.always_pxe = always_pxe;
        self
    }

    /// Set user data.
    #[must_use]
    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }

    /// Set tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the deletion lock.
    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the device boots from a user-supplied iPXE script.
    #[must_use]
    pub fn is_custom_ipxe(&self) -> bool {
        self.operating_system == CUSTOM_IPXE
    }

    /// iPXE script URL, treating an empty string as unset.
    #[must_use]
    pub fn ipxe_script_url(&self) -> Option<&str> {
        non_empty(self.ipxe_script_url.as_deref())
    }

    /// User data, treating an empty string as unset.
    #[must_use]
    pub fn user_data(&self) -> Option<&str> {
        non_empty(self.user_data.as_deref())
    }

    /// Description, treating an empty string as unset.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        non_empty(self.description.as_deref())
    }

    /// Build the provider submission for this spec.
    ///
    /// Callers validate first; `None` means the billing cycle did not parse.
    #[must_use]
    pub fn to_create_request(&self) -> Option<CreateDeviceRequest> {
        let billing_cycle: BillingCycle = self.billing_cycle.parse().ok()?;
        Some(CreateDeviceRequest {
            hostname: self.hostname.clone(),
            plan: self.plan.clone(),
            facility: self.facility.clone(),
            operating_system: self.operating_system.clone(),
            billing_cycle,
            project_id: self.project_id.clone(),
            public_ipv4_subnet_size: self.public_ipv4_subnet_size,
            ipxe_script_url: self.ipxe_script_url().map(str::to_string),
            always_pxe: self.always_pxe,
            user_data: self.user_data().map(str::to_string),
            tags: self.tags.clone(),
            locked: self.locked,
            description: self.description().map(str::to_string),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Locally cached attributes of a device, as last read from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub id: String,
    pub hostname: String,
    pub plan: String,
    pub facility: String,
    pub operating_system: String,
    pub billing_cycle: String,
    pub project_id: String,
    pub state: DeviceStatus,
    /// Empty until provisioning completes.
    pub root_password: String,
    pub public_ipv4_subnet_size: u32,
    pub access_public_ipv4: String,
    pub access_private_ipv4: String,
    pub access_public_ipv6: String,
    /// Empty when unset.
    pub ipxe_script_url: String,
    pub always_pxe: bool,
    pub user_data: String,
    pub tags: Vec<String>,
    pub locked: bool,
    pub description: String,
}

/// Attributes whose values are never printed.
pub const SENSITIVE_ATTRIBUTES: [&str; 2] = ["root_password", "user_data"];

impl From<&DeviceRecord> for DeviceState {
    fn from(record: &DeviceRecord) -> Self {
        let public_ipv4 = record
            .ip_addresses
            .iter()
            .find(|ip| ip.address_family == 4 && ip.public);
        let private_ipv4 = record
            .ip_addresses
            .iter()
            .find(|ip| ip.address_family == 4 && !ip.public);
        let public_ipv6 = record
            .ip_addresses
            .iter()
            .find(|ip| ip.address_family == 6 && ip.public);

        Self {
            id: record.id.clone(),
            hostname: record.hostname.clone(),
            plan: record.plan.clone(),
            facility: record.facility.clone(),
            operating_system: record.operating_system.clone(),
            billing_cycle: record.billing_cycle.clone(),
            project_id: record.project_id.clone(),
            state: record.state,
            root_password: record.root_password.clone().unwrap_or_default(),
            public_ipv4_subnet_size: public_ipv4
                .map_or(DEFAULT_PUBLIC_IPV4_SUBNET_SIZE, |ip| ip.cidr),
            access_public_ipv4: public_ipv4.map(|ip| ip.address.clone()).unwrap_or_default(),
            access_private_ipv4: private_ipv4.map(|ip| ip.address.clone()).unwrap_or_default(),
            access_public_ipv6: public_ipv6.map(|ip| ip.address.clone()).unwrap_or_default(),
            ipxe_script_url: record.ipxe_script_url.clone().unwrap_or_default(),
            always_pxe: record.always_pxe,
            user_data: record.user_data.clone().unwrap_or_default(),
            tags: record.tags.clone(),
            locked: record.locked,
            description: record.description.clone().unwrap_or_default(),
        }
    }
}

impl DeviceState {
    /// Attribute name/value pairs in a stable order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.clone()),
            ("hostname", self.hostname.clone()),
            ("plan", self.plan.clone()),
            ("facility", self.facility.clone()),
            ("operating_system", self.operating_system.clone()),
            ("billing_cycle", self.billing_cycle.clone()),
            ("project_id", self.project_id.clone()),
            ("state", self.state.to_string()),
            ("root_password", self.root_password.clone()),
            (
                "public_ipv4_subnet_size",
                self.public_ipv4_subnet_size.to_string(),
            ),
            ("access_public_ipv4", self.access_public_ipv4.clone()),
            ("access_private_ipv4", self.access_private_ipv4.clone()),
            ("access_public_ipv6", self.access_public_ipv6.clone()),
            ("ipxe_script_url", self.ipxe_script_url.clone()),
            ("always_pxe", self.always_pxe.to_string()),
            ("user_data", self.user_data.clone()),
            ("tags", self.tags.join(",")),
            ("locked", self.locked.to_string()),
            ("description", self.description.clone()),
        ]
    }
}
