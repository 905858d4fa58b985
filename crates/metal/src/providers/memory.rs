//! In-process device API simulator.
//!
//! Devices advance through `queued → provisioning → active` as they are
//! polled, so lifecycle code can be exercised without a real provider.
//! Failure injection covers rejected submissions, provider-side provisioning
//! failures, transient read errors and slow removals.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::device::DEFAULT_PUBLIC_IPV4_SUBNET_SIZE;
use crate::providers::traits::{
    ApiError, CreateDeviceRequest, DeviceApi, DeviceRecord, DeviceStatus, IpAssignment,
    UpdateDeviceRequest,
};

/// Counts of remote calls made against the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub get: usize,
    pub update: usize,
    pub delete: usize,
    pub list: usize,
}

impl CallCounts {
    /// Total calls of any kind.
    #[must_use]
    pub fn total(&self) -> usize {
        self.create + self.get + self.update + self.delete + self.list
    }
}

#[derive(Debug)]
struct SimDevice {
    record: DeviceRecord,
    /// Reads left before provisioning settles.
    polls_until_settled: u32,
    /// Reads left before a deleted device disappears; `None` while not deleted.
    polls_until_removed: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<String, SimDevice>,
    calls: CallCounts,
    transient_get_failures: u32,
    next_serial: u32,
}

/// Simulated Packet-style device API.
#[derive(Debug, Default)]
pub struct MemoryApi {
    inner: Mutex<Inner>,
    provision_polls: u32,
    removal_polls: u32,
    fail_provisioning: bool,
    active_on_create: bool,
    reject_create: Option<String>,
}

impl MemoryApi {
    /// Simulator whose devices become active on the first read.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reads a new device spends provisioning before settling.
    #[must_use]
    pub fn with_provision_polls(mut self, polls: u32) -> Self {
        self.provision_polls = polls;
        self
    }

    /// Number of reads a deleted device keeps showing up as deprovisioning.
    #[must_use]
    pub fn with_removal_polls(mut self, polls: u32) -> Self {
        self.removal_polls = polls;
        self
    }

    /// Settle new devices in `failed` instead of `active`.
    #[must_use]
    pub fn with_failing_provisioning(mut self) -> Self {
        self.fail_provisioning = true;
        self
    }

    /// Report new devices as already active in the create response, without
    /// the root password. Reads return the full record.
    #[must_use]
    pub fn with_active_on_create(mut self) -> Self {
        self.active_on_create = true;
        self
    }

    /// Reject every submission with a 422 carrying `message`.
    #[must_use]
    pub fn with_rejected_create(mut self, message: impl Into<String>) -> Self {
        self.reject_create = Some(message.into());
        self
    }

    /// Make the next `count` reads fail with a 503.
    pub async fn inject_transient_get_failures(&self, count: u32) {
        self.inner.lock().await.transient_get_failures = count;
    }

    /// Remove a device out of band, as if deleted through another client.
    pub async fn remove_externally(&self, id: &str) -> bool {
        self.inner.lock().await.devices.remove(id).is_some()
    }

    /// Mutate a device out of band.
    pub async fn modify_externally(&self, id: &str, f: impl FnOnce(&mut DeviceRecord)) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.devices.get_mut(id) {
            Some(device) => {
                f(&mut device.record);
                true
            }
            None => false,
        }
    }

    /// Remote calls made so far.
    pub async fn calls(&self) -> CallCounts {
        self.inner.lock().await.calls
    }

    /// IDs of every device the simulator still holds.
    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().await.devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn settle(&self, device: &mut SimDevice) {
        if device.polls_until_settled > 0 {
            device.polls_until_settled -= 1;
            device.record.state = DeviceStatus::Provisioning;
            return;
        }
        if matches!(
            device.record.state,
            DeviceStatus::Queued | DeviceStatus::Provisioning
        ) {
            if self.fail_provisioning {
                device.record.state = DeviceStatus::Failed;
            } else {
                device.record.state = DeviceStatus::Active;
                device.record.root_password = Some(uuid::Uuid::new_v4().simple().to_string());
            }
            device.record.updated_at = Some(Utc::now());
        }
    }
}

#[async_trait]
impl DeviceApi for MemoryApi {
    async fn create_device(&self, req: &CreateDeviceRequest) -> Result<DeviceRecord, ApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.create += 1;

        if let Some(message) = &self.reject_create {
            return Err(ApiError::Api {
                status: 422,
                message: message.clone(),
            });
        }

        inner.next_serial += 1;
        let serial = inner.next_serial;
        let id = uuid::Uuid::new_v4().to_string();
        let cidr = req
            .public_ipv4_subnet_size
            .unwrap_or(DEFAULT_PUBLIC_IPV4_SUBNET_SIZE);
        let now = Utc::now();

        let record = DeviceRecord {
            id: id.clone(),
            hostname: req.hostname.clone(),
            state: DeviceStatus::Queued,
            root_password: None,
            plan: req.plan.clone(),
            facility: req.facility.clone(),
            operating_system: req.operating_system.clone(),
            billing_cycle: req.billing_cycle.to_string(),
            project_id: req.project_id.clone(),
            ip_addresses: vec![
                IpAssignment {
                    address: format!("147.75.{}.{}", serial / 256, serial % 256),
                    address_family: 4,
                    public: true,
                    cidr,
                },
                IpAssignment {
                    address: format!("10.80.{}.{}", serial / 256, serial % 256),
                    address_family: 4,
                    public: false,
                    cidr: 31,
                },
                IpAssignment {
                    address: format!("2604:1380::{serial:x}"),
                    address_family: 6,
                    public: true,
                    cidr: 127,
                },
            ],
            ipxe_script_url: req.ipxe_script_url.clone(),
            always_pxe: req.always_pxe,
            user_data: req.user_data.clone(),
            tags: req.tags.clone(),
            locked: req.locked,
            description: req.description.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };

        let mut stored = record.clone();
        let mut response = record;
        if self.active_on_create {
            stored.state = DeviceStatus::Active;
            stored.root_password = Some(uuid::Uuid::new_v4().simple().to_string());
            response.state = DeviceStatus::Active;
        }

        debug!(device_id = %id, state = %response.state, "Simulated device submitted");
        inner.devices.insert(
            id,
            SimDevice {
                record: stored,
                polls_until_settled: if self.active_on_create {
                    0
                } else {
                    self.provision_polls
                },
                polls_until_removed: None,
            },
        );
        Ok(response)
    }

    async fn get_device(&self, id: &str) -> Result<DeviceRecord, ApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.get += 1;

        if inner.transient_get_failures > 0 {
            inner.transient_get_failures -= 1;
            return Err(ApiError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let Some(device) = inner.devices.get_mut(id) else {
            return Err(ApiError::NotFound(format!("device {id}")));
        };

        let removal = device.polls_until_removed;
        match removal {
            Some(0) => {
                inner.devices.remove(id);
                return Err(ApiError::NotFound(format!("device {id}")));
            }
            Some(left) => {
                device.polls_until_removed = Some(left - 1);
                device.record.state = DeviceStatus::Deprovisioning;
            }
            None => self.settle(device),
        }

        Ok(device.record.clone())
    }

    async fn update_device(
        &self,
        id: &str,
        req: &UpdateDeviceRequest,
    ) -> Result<DeviceRecord, ApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.update += 1;

        let Some(device) = inner.devices.get_mut(id) else {
            return Err(ApiError::NotFound(format!("device {id}")));
        };

        let record = &mut device.record;
        if let Some(hostname) = &req.hostname {
            record.hostname.clone_from(hostname);
        }
        if let Some(user_data) = &req.user_data {
            record.user_data = Some(user_data.clone()).filter(|u| !u.is_empty());
        }
        if let Some(url) = &req.ipxe_script_url {
            record.ipxe_script_url = Some(url.clone()).filter(|u| !u.is_empty());
        }
        if let Some(always_pxe) = req.always_pxe {
            record.always_pxe = always_pxe;
        }
        if let Some(tags) = &req.tags {
            record.tags.clone_from(tags);
        }
        if let Some(locked) = req.locked {
            record.locked = locked;
        }
        if let Some(description) = &req.description {
            record.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        record.updated_at = Some(Utc::now());

        Ok(record.clone())
    }

    async fn delete_device(&self, id: &str) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.delete += 1;

        let Some(device) = inner.devices.get_mut(id) else {
            return Err(ApiError::NotFound(format!("device {id}")));
        };
        if device.record.locked {
            return Err(ApiError::Api {
                status: 422,
                message: "Cannot delete a locked device".to_string(),
            });
        }

        if self.removal_polls == 0 {
            inner.devices.remove(id);
        } else if device.polls_until_removed.is_none() {
            device.polls_until_removed = Some(self.removal_polls);
        }
        Ok(())
    }

    async fn list_project_devices(&self, project_id: &str) -> Result<Vec<DeviceRecord>, ApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.list += 1;

        let mut devices: Vec<DeviceRecord> = inner
            .devices
            .values()
            .filter(|d| d.record.project_id == project_id)
            .map(|d| d.record.clone())
            .collect();
        devices.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(devices)
    }
}
