//! Packet API request and response models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Common types
// ============================================================================

/// Error body returned by the API, e.g. `{"errors": ["Plan is not available"]}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Error messages.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A reference to another resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Href {
    /// Resource ID, when embedded.
    pub id: Option<String>,
    /// Resource path (e.g., `/projects/<id>`).
    pub href: Option<String>,
}

impl Href {
    /// Resolve the referenced ID, falling back to the last path segment.
    #[must_use]
    pub fn resolve_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| {
                self.href
                    .as_deref()
                    .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }
}

/// Pagination metadata on list responses.
#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    /// Last available page.
    pub last_page: Option<u32>,
}

// ============================================================================
// Device types
// ============================================================================

/// Device resource from API.
#[derive(Debug, Deserialize)]
pub struct DeviceResource {
    /// Device ID.
    pub id: String,
    /// Hostname.
    pub hostname: String,
    /// Provisioning state.
    pub state: String,
    /// Root password, once provisioned.
    pub root_password: Option<String>,
    /// Billing cycle.
    pub billing_cycle: Option<String>,
    /// Network boot on every restart.
    #[serde(default)]
    pub always_pxe: bool,
    /// iPXE script URL.
    pub ipxe_script_url: Option<String>,
    /// User data.
    pub userdata: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Deletion lock.
    #[serde(default)]
    pub locked: bool,
    /// Description.
    pub description: Option<String>,
    /// Plan.
    pub plan: Option<Slug>,
    /// Facility.
    pub facility: Option<Facility>,
    /// Operating system.
    pub operating_system: Option<Slug>,
    /// Owning project.
    pub project: Option<Href>,
    /// IP allocations.
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

/// A slugged reference (plan, operating system).
#[derive(Debug, Deserialize)]
pub struct Slug {
    /// Slug.
    pub slug: String,
}

/// Facility info.
#[derive(Debug, Deserialize)]
pub struct Facility {
    /// Facility code (e.g., `sjc1`).
    pub code: String,
}

/// IP address info.
#[derive(Debug, Deserialize)]
pub struct IpAddress {
    /// Address.
    pub address: String,
    /// 4 or 6.
    pub address_family: u8,
    /// Publicly routable.
    #[serde(default)]
    pub public: bool,
    /// Prefix length.
    pub cidr: u32,
}

/// List devices response.
#[derive(Debug, Deserialize)]
pub struct DeviceList {
    /// Devices on this page.
    #[serde(default)]
    pub devices: Vec<DeviceResource>,
    /// Pagination.
    #[serde(default)]
    pub meta: Meta,
}

// ============================================================================
// Create / update requests
// ============================================================================

/// Request body for creating a device.
#[derive(Debug, Serialize)]
pub struct CreateDeviceBody {
    pub hostname: String,
    pub plan: String,
    pub facility: String,
    pub operating_system: String,
    pub billing_cycle: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ipv4_subnet_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipxe_script_url: Option<String>,
    pub always_pxe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdata: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request body for updating a device.
#[derive(Debug, Serialize)]
pub struct UpdateDeviceBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipxe_script_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_pxe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_href_resolves_trailing_segment() {
        let href = Href {
            id: None,
            href: Some("/projects/93125c2a-8b78-4d4f-a3c4-7367d6b7cca8".to_string()),
        };
        assert_eq!(href.resolve_id(), "93125c2a-8b78-4d4f-a3c4-7367d6b7cca8");

        let embedded = Href {
            id: Some("abc".to_string()),
            href: Some("/projects/def".to_string()),
        };
        assert_eq!(embedded.resolve_id(), "abc");
    }

    #[test]
    fn test_device_resource_parses_minimal_body() {
        let body = r#"{"id": "d1", "hostname": "h", "state": "queued"}"#;
        let device: DeviceResource = serde_json::from_str(body).unwrap();
        assert_eq!(device.state, "queued");
        assert!(device.ip_addresses.is_empty());
        assert!(!device.always_pxe);
    }
}
