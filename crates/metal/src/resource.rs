//! The device resource: entry points a declarative front end calls.
//!
//! Create, read, update and delete map onto the provisioner, reconciler and
//! teardown controller. All of them share one injected [`DeviceApi`].

use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::device::{DeviceSpec, DeviceState};
use crate::error::DeviceError;
use crate::lifecycle::{Provisioned, Provisioner};
use crate::providers::{DeviceApi, UpdateDeviceRequest};
use crate::reconcile::{Reconciler, Refresh};
use crate::teardown::Teardown;
use crate::validate::validate;
use crate::wait::Deadline;

/// Fields that cannot change without replacing the device.
pub const FORCE_NEW_FIELDS: [&str; 6] = [
    "plan",
    "facility",
    "operating_system",
    "billing_cycle",
    "project_id",
    "public_ipv4_subnet_size",
];

/// Lifecycle operations for one kind of resource: a bare metal device.
#[derive(Clone)]
pub struct DeviceResource {
    provisioner: Provisioner,
    reconciler: Reconciler,
    teardown: Teardown,
    api: Arc<dyn DeviceApi>,
}

impl std::fmt::Debug for DeviceResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceResource")
            .field("provisioner", &self.provisioner)
            .finish_non_exhaustive()
    }
}

impl DeviceResource {
    /// Build the resource over an injected API client.
    #[must_use]
    pub fn new(api: Arc<dyn DeviceApi>, config: &EngineConfig) -> Self {
        Self {
            provisioner: Provisioner::new(api.clone(), config.poll_interval()),
            reconciler: Reconciler::new(api.clone()),
            teardown: Teardown::new(api.clone(), config.poll_interval()),
            api,
        }
    }

    /// Validate `spec`, create the device and wait for it to become active.
    ///
    /// # Errors
    /// See [`Provisioner::run`].
    pub async fn create(
        &self,
        spec: &DeviceSpec,
        deadline: &Deadline,
    ) -> Result<Provisioned, DeviceError> {
        self.provisioner.provision(spec, deadline).await
    }

    /// Refresh device `id` from the provider.
    ///
    /// # Errors
    /// See [`Reconciler::refresh`].
    pub async fn read(
        &self,
        id: &str,
        cached: Option<&DeviceState>,
    ) -> Result<Refresh, DeviceError> {
        self.reconciler.refresh(id, cached).await
    }

    /// Apply the difference between `prior` and `desired` to device `id`.
    ///
    /// Only fields the provider can change in place are sent. Any change to
    /// a field in [`FORCE_NEW_FIELDS`] is refused before a remote call.
    ///
    /// # Errors
    /// - [`DeviceError::Validation`] if `desired` is invalid
    /// - [`DeviceError::RequiresReplacement`] if a force-new field changed
    /// - [`DeviceError::Gone`] if the device no longer exists
    /// - [`DeviceError::RemoteRejected`] if the provider refuses the update
    pub async fn update(
        &self,
        id: &str,
        prior: &DeviceSpec,
        desired: &DeviceSpec,
    ) -> Result<DeviceState, DeviceError> {
        validate(desired)?;

        let replaced = replacement_fields(prior, desired);
        if !replaced.is_empty() {
            return Err(DeviceError::RequiresReplacement {
                id: id.to_string(),
                fields: replaced,
            });
        }

        let changes = in_place_changes(prior, desired);
        if changes.is_empty() {
            info!(device_id = %id, "No in-place changes, refreshing");
        } else {
            match self.api.update_device(id, &changes).await {
                Ok(_) => info!(device_id = %id, "Device updated"),
                Err(e) if e.is_not_found() => return Err(DeviceError::Gone { id: id.to_string() }),
                Err(e) => return Err(DeviceError::remote(Some(id), e)),
            }
        }

        match self.reconciler.refresh(id, None).await? {
            Refresh::Present { state, .. } => Ok(state),
            Refresh::Gone { id } => Err(DeviceError::Gone { id }),
        }
    }

    /// Delete device `id` and wait until it is gone.
    ///
    /// # Errors
    /// See [`Teardown::destroy`].
    pub async fn delete(&self, id: &str, deadline: &Deadline) -> Result<(), DeviceError> {
        self.teardown.destroy(id, deadline).await
    }

    /// List every device in `project_id`.
    ///
    /// # Errors
    /// See [`Reconciler::list`].
    pub async fn list(&self, project_id: &str) -> Result<Vec<DeviceState>, DeviceError> {
        self.reconciler.list(project_id).await
    }
}

/// Force-new fields whose value differs between `prior` and `desired`.
#[must_use]
pub fn replacement_fields(prior: &DeviceSpec, desired: &DeviceSpec) -> Vec<&'static str> {
    let changed = [
        prior.plan != desired.plan,
        prior.facility != desired.facility,
        prior.operating_system != desired.operating_system,
        prior.billing_cycle != desired.billing_cycle,
        prior.project_id != desired.project_id,
        prior.public_ipv4_subnet_size != desired.public_ipv4_subnet_size,
    ];
    FORCE_NEW_FIELDS
        .into_iter()
        .zip(changed)
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

/// In-place update covering only fields that changed. Cleared strings are sent
/// as empty values so the provider unsets them.
#[must_use]
pub fn in_place_changes(prior: &DeviceSpec, desired: &DeviceSpec) -> UpdateDeviceRequest {
    fn changed_str(prior: Option<&str>, desired: Option<&str>) -> Option<String> {
        (prior != desired).then(|| desired.unwrap_or_default().to_string())
    }

    UpdateDeviceRequest {
        hostname: (prior.hostname != desired.hostname).then(|| desired.hostname.clone()),
        user_data: changed_str(prior.user_data(), desired.user_data()),
        ipxe_script_url: changed_str(prior.ipxe_script_url(), desired.ipxe_script_url()),
        always_pxe: (prior.always_pxe != desired.always_pxe).then_some(desired.always_pxe),
        tags: (prior.tags != desired.tags).then(|| desired.tags.clone()),
        locked: (prior.locked != desired.locked).then_some(desired.locked),
        description: changed_str(prior.description(), desired.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CUSTOM_IPXE;
    use crate::providers::memory::MemoryApi;
    use crate::providers::DeviceStatus;

    fn spec() -> DeviceSpec {
        DeviceSpec::new(
            "test-device",
            "baremetal_0",
            "sjc1",
            "ubuntu_16_04",
            "hourly",
            "p1",
        )
    }

    fn resource(api: &Arc<MemoryApi>) -> DeviceResource {
        DeviceResource::new(api.clone(), &EngineConfig::default())
    }

    #[test]
    fn test_replacement_fields() {
        let desired = DeviceSpec {
            plan: "baremetal_1".to_string(),
            ..spec()
        }
        .with_subnet_size(29);
        assert_eq!(
            replacement_fields(&spec(), &desired),
            vec!["plan", "public_ipv4_subnet_size"]
        );
        assert!(replacement_fields(&spec(), &spec().with_tags(["a"])).is_empty());
    }

    #[test]
    fn test_in_place_changes_only_carry_differences() {
        let prior = spec().with_description("old");
        let desired = DeviceSpec {
            hostname: "renamed".to_string(),
            ..spec()
        }
        .with_locked(true);

        let changes = in_place_changes(&prior, &desired);
        assert_eq!(changes.hostname.as_deref(), Some("renamed"));
        assert_eq!(changes.locked, Some(true));
        assert_eq!(changes.description.as_deref(), Some(""));
        assert_eq!(changes.user_data, None);
        assert_eq!(changes.tags, None);
        assert!(in_place_changes(&prior, &prior).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_in_place() {
        let api = Arc::new(MemoryApi::new());
        let resource = resource(&api);
        let prior = DeviceSpec {
            operating_system: CUSTOM_IPXE.to_string(),
            ..spec()
        }
        .with_ipxe_script_url("https://boot.netboot.xyz");
        let created = resource
            .create(&prior, &Deadline::after_secs(600))
            .await
            .unwrap();

        let desired = prior.clone().with_always_pxe(true).with_tags(["edge"]);
        let state = resource
            .update(&created.state.id, &prior, &desired)
            .await
            .unwrap();

        assert!(state.always_pxe);
        assert_eq!(state.tags, vec!["edge"]);
        assert_eq!(state.state, DeviceStatus::Active);
        assert_eq!(api.calls().await.update, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_force_new_field_makes_no_call() {
        let api = Arc::new(MemoryApi::new());
        let resource = resource(&api);
        let created = resource
            .create(&spec(), &Deadline::after_secs(600))
            .await
            .unwrap();
        let before = api.calls().await;

        let desired = DeviceSpec {
            facility: "ewr1".to_string(),
            ..spec()
        };
        let err = resource
            .update(&created.state.id, &spec(), &desired)
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceError::RequiresReplacement { .. }));
        assert_eq!(api.calls().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_validates_desired_spec() {
        let api = Arc::new(MemoryApi::new());
        let err = resource(&api)
            .update(
                "d1",
                &spec(),
                &spec().with_user_data("x").with_ipxe_script_url("https://a.b"),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("conflicts with"));
        assert_eq!(api.calls().await.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_in_config_is_clamped() {
        let api = Arc::new(MemoryApi::new().with_provision_polls(1_000));
        let config = EngineConfig {
            poll_interval_secs: 0,
            ..EngineConfig::default()
        };
        let err = DeviceResource::new(api.clone(), &config)
            .create(&spec(), &Deadline::after_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceError::TimedOut { .. }));
        assert!(api.calls().await.get <= 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_of_missing_device_is_gone() {
        let api = Arc::new(MemoryApi::new());
        let desired = spec().with_tags(["x"]);
        let err = resource(&api)
            .update("missing", &spec(), &desired)
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceError::Gone { .. }));
    }
}
