//! Read-back of remote device state.
//!
//! The provider is authoritative: every refresh rebuilds the whole attribute
//! set from the fetched record. Differences from the previously cached set
//! are reported as drift, never merged.

use std::sync::Arc;

use tracing::{info, warn};

use crate::device::{DeviceState, SENSITIVE_ATTRIBUTES};
use crate::error::DeviceError;
use crate::providers::DeviceApi;

/// One attribute that changed outside this engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    /// Attribute name.
    pub attribute: &'static str,
    /// Previously cached value.
    pub cached: String,
    /// Value now reported by the provider.
    pub remote: String,
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if SENSITIVE_ATTRIBUTES.contains(&self.attribute) {
            write!(f, "{}: (sensitive value changed)", self.attribute)
        } else {
            write!(f, "{}: {:?} -> {:?}", self.attribute, self.cached, self.remote)
        }
    }
}

/// Outcome of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The device exists; `state` replaces the cached attributes.
    Present {
        state: DeviceState,
        drift: Vec<Drift>,
    },
    /// The device no longer exists and should be treated as deleted.
    Gone { id: String },
}

/// Compare two attribute sets, attribute by attribute.
#[must_use]
pub fn diff(cached: &DeviceState, remote: &DeviceState) -> Vec<Drift> {
    cached
        .attributes()
        .into_iter()
        .zip(remote.attributes())
        .filter(|((_, old), (_, new))| old != new)
        .map(|((attribute, cached), (_, remote))| Drift {
            attribute,
            cached,
            remote,
        })
        .collect()
}

/// Maps remote device records onto local attribute sets.
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn DeviceApi>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn DeviceApi>) -> Self {
        Self { api }
    }

    /// Fetch device `id` and rebuild its attribute set.
    ///
    /// # Errors
    /// Returns [`DeviceError::RemoteRejected`] for any provider error other
    /// than not-found, which yields [`Refresh::Gone`].
    pub async fn refresh(
        &self,
        id: &str,
        cached: Option<&DeviceState>,
    ) -> Result<Refresh, DeviceError> {
        let record = match self.api.get_device(id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                warn!(device_id = %id, "Device no longer exists on provider");
                return Ok(Refresh::Gone { id: id.to_string() });
            }
            Err(e) => return Err(DeviceError::remote(Some(id), e)),
        };

        let state = DeviceState::from(&record);
        let drift = cached.map(|c| diff(c, &state)).unwrap_or_default();
        if !drift.is_empty() {
            info!(
                device_id = %id,
                attributes = ?drift.iter().map(|d| d.attribute).collect::<Vec<_>>(),
                "Drift detected"
            );
        }

        Ok(Refresh::Present { state, drift })
    }

    /// Fetch every device in a project.
    ///
    /// # Errors
    /// Returns [`DeviceError::RemoteRejected`] if the listing fails.
    pub async fn list(&self, project_id: &str) -> Result<Vec<DeviceState>, DeviceError> {
        let records = self
            .api
            .list_project_devices(project_id)
            .await
            .map_err(|e| DeviceError::remote(None, e))?;
        Ok(records.iter().map(DeviceState::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemoryApi;
    use crate::providers::{BillingCycle, CreateDeviceRequest, DeviceStatus};

    fn request(hostname: &str) -> CreateDeviceRequest {
        CreateDeviceRequest {
            hostname: hostname.to_string(),
            plan: "baremetal_0".to_string(),
            facility: "sjc1".to_string(),
            operating_system: "ubuntu_16_04".to_string(),
            billing_cycle: BillingCycle::Hourly,
            project_id: "p1".to_string(),
            public_ipv4_subnet_size: None,
            ipxe_script_url: None,
            always_pxe: false,
            user_data: None,
            tags: vec![],
            locked: false,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_overwrites_and_reports_drift() {
        let api = Arc::new(MemoryApi::new());
        let id = api.create_device(&request("web-1")).await.unwrap().id;
        let reconciler = Reconciler::new(api.clone());

        let Refresh::Present { state: cached, .. } = reconciler.refresh(&id, None).await.unwrap()
        else {
            panic!("device should exist");
        };
        assert_eq!(cached.state, DeviceStatus::Active);

        api.modify_externally(&id, |record| {
            record.hostname = "renamed".to_string();
            record.tags = vec!["prod".to_string()];
        })
        .await;

        match reconciler.refresh(&id, Some(&cached)).await.unwrap() {
            Refresh::Present { state, drift } => {
                assert_eq!(state.hostname, "renamed");
                let changed: Vec<_> = drift.iter().map(|d| d.attribute).collect();
                assert_eq!(changed, vec!["hostname", "tags"]);
                assert_eq!(drift[0].to_string(), "hostname: \"web-1\" -> \"renamed\"");
            }
            Refresh::Gone { .. } => panic!("device should exist"),
        }
    }

    #[tokio::test]
    async fn test_refresh_reports_gone() {
        let api = Arc::new(MemoryApi::new());
        let id = api.create_device(&request("web-1")).await.unwrap().id;
        api.remove_externally(&id).await;

        let refresh = Reconciler::new(api).refresh(&id, None).await.unwrap();
        assert_eq!(refresh, Refresh::Gone { id });
    }

    #[tokio::test]
    async fn test_refresh_surfaces_other_errors() {
        let api = Arc::new(MemoryApi::new());
        api.inject_transient_get_failures(1).await;

        let err = Reconciler::new(api).refresh("d1", None).await.unwrap_err();
        assert!(matches!(err, DeviceError::RemoteRejected { .. }));
        assert_eq!(err.partial_id(), Some("d1"));
    }

    #[test]
    fn test_sensitive_drift_is_masked() {
        let drift = Drift {
            attribute: "root_password",
            cached: "old".to_string(),
            remote: "new".to_string(),
        };
        assert_eq!(drift.to_string(), "root_password: (sensitive value changed)");
    }

    #[tokio::test]
    async fn test_list_filters_by_project() {
        let api = Arc::new(MemoryApi::new());
        api.create_device(&request("a")).await.unwrap();
        let mut other = request("b");
        other.project_id = "p2".to_string();
        api.create_device(&other).await.unwrap();

        let devices = Reconciler::new(api).list("p1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hostname, "a");
    }
}
