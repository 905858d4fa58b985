//! End-to-end device lifecycle against the simulated provider.
//!
//! Every test runs on a paused tokio clock, so multi-minute provisioning
//! waits complete instantly.

use std::sync::Arc;

use packet_metal::providers::memory::MemoryApi;
use packet_metal::{
    check_destroyed, Deadline, DeviceError, DeviceResource, DeviceSpec, DeviceStatus,
    EngineConfig, LifecyclePhase, Refresh, CUSTOM_IPXE,
};

const BOOT_URL: &str = "https://boot.netboot.xyz";

fn ubuntu() -> DeviceSpec {
    DeviceSpec::new(
        "tf-test-device",
        "baremetal_0",
        "sjc1",
        "ubuntu_16_04",
        "hourly",
        "project-1",
    )
}

fn custom_ipxe() -> DeviceSpec {
    DeviceSpec {
        operating_system: CUSTOM_IPXE.to_string(),
        ..ubuntu()
    }
}

fn setup(api: MemoryApi) -> (Arc<MemoryApi>, DeviceResource) {
    let api = Arc::new(api);
    let resource = DeviceResource::new(api.clone(), &EngineConfig::default());
    (api, resource)
}

async fn refreshed(resource: &DeviceResource, id: &str) -> packet_metal::DeviceState {
    match resource.read(id, None).await.unwrap() {
        Refresh::Present { state, .. } => state,
        Refresh::Gone { id } => panic!("device {id} unexpectedly gone"),
    }
}

#[tokio::test(start_paused = true)]
async fn basic_device_reads_back_defaults() {
    let (_, resource) = setup(MemoryApi::new().with_provision_polls(3));

    let device = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();
    assert_eq!(
        device.history.last().copied(),
        Some(LifecyclePhase::Active)
    );

    let state = refreshed(&resource, &device.state.id).await;
    assert_eq!(state.state, DeviceStatus::Active);
    assert_eq!(state.public_ipv4_subnet_size, 31);
    assert_eq!(state.ipxe_script_url, "");
    assert!(!state.always_pxe);
    assert!(!state.root_password.is_empty());
    assert_eq!(state.hostname, "tf-test-device");
}

#[tokio::test(start_paused = true)]
async fn requested_subnet_size_reads_back() {
    let (_, resource) = setup(MemoryApi::new().with_provision_polls(2));

    let device = resource
        .create(&ubuntu().with_subnet_size(29), &Deadline::after_secs(1200))
        .await
        .unwrap();

    let state = refreshed(&resource, &device.state.id).await;
    assert_eq!(state.public_ipv4_subnet_size, 29);
}

#[tokio::test(start_paused = true)]
async fn custom_ipxe_script_url_reads_back() {
    let (_, resource) = setup(MemoryApi::new().with_provision_polls(2));

    let device = resource
        .create(
            &custom_ipxe().with_ipxe_script_url(BOOT_URL),
            &Deadline::after_secs(1200),
        )
        .await
        .unwrap();

    let state = refreshed(&resource, &device.state.id).await;
    assert_eq!(state.ipxe_script_url, BOOT_URL);
    assert!(!state.always_pxe);
}

#[tokio::test(start_paused = true)]
async fn always_pxe_reads_back() {
    let (_, resource) = setup(MemoryApi::new().with_provision_polls(2));

    let device = resource
        .create(
            &custom_ipxe()
                .with_ipxe_script_url(BOOT_URL)
                .with_always_pxe(true),
            &Deadline::after_secs(1200),
        )
        .await
        .unwrap();

    let state = refreshed(&resource, &device.state.id).await;
    assert!(state.always_pxe);
}

#[tokio::test(start_paused = true)]
async fn user_data_with_ipxe_is_rejected_before_any_call() {
    let (api, resource) = setup(MemoryApi::new());

    let spec = custom_ipxe()
        .with_user_data("#!ipxe\nchain https://boot.netboot.xyz")
        .with_ipxe_script_url(BOOT_URL)
        .with_always_pxe(true);
    let err = resource
        .create(&spec, &Deadline::after_secs(1200))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("conflicts with"), "{err}");
    assert_eq!(api.calls().await.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn always_pxe_without_script_is_rejected() {
    let (api, resource) = setup(MemoryApi::new());

    let spec = custom_ipxe().with_always_pxe(true);
    let err = resource
        .create(&spec, &Deadline::after_secs(1200))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("must be provided when"), "{err}");
    assert_eq!(api.calls().await.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_provisioning_reports_device_id() {
    let (api, resource) = setup(
        MemoryApi::new()
            .with_provision_polls(1)
            .with_failing_provisioning(),
    );

    let err = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceError::ProvisioningFailed { .. }));
    let id = err.partial_id().unwrap().to_string();
    assert_eq!(api.device_ids().await, vec![id]);
}

#[tokio::test(start_paused = true)]
async fn slow_device_times_out_with_partial_id() {
    let (api, resource) = setup(MemoryApi::new().with_provision_polls(1_000));

    let err = resource
        .create(&ubuntu(), &Deadline::after_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceError::TimedOut { .. }));
    assert!(err.to_string().contains("did not become active within deadline"));
    assert!(err.partial_id().is_some());
    assert!(api.calls().await.get >= 6);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let (api, resource) = setup(MemoryApi::new().with_provision_polls(1));
    api.inject_transient_get_failures(3).await;

    let device = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();

    assert_eq!(device.state.state, DeviceStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn refresh_after_external_delete_is_gone() {
    let (api, resource) = setup(MemoryApi::new());
    let device = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();

    assert!(api.remove_externally(&device.state.id).await);

    let refresh = resource
        .read(&device.state.id, Some(&device.state))
        .await
        .unwrap();
    assert_eq!(
        refresh,
        Refresh::Gone {
            id: device.state.id.clone()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn refresh_reports_out_of_band_changes() {
    let (api, resource) = setup(MemoryApi::new());
    let device = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();

    api.modify_externally(&device.state.id, |record| {
        record.hostname = "renamed-elsewhere".to_string();
    })
    .await;

    let Refresh::Present { state, drift } = resource
        .read(&device.state.id, Some(&device.state))
        .await
        .unwrap()
    else {
        panic!("device should still exist");
    };

    assert_eq!(state.hostname, "renamed-elsewhere");
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].attribute, "hostname");
}

#[tokio::test(start_paused = true)]
async fn destroy_is_idempotent_and_verified() {
    let (api, resource) = setup(MemoryApi::new().with_removal_polls(3));
    let device = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();
    let id = device.state.id;

    resource.delete(&id, &Deadline::after_secs(600)).await.unwrap();
    resource.delete(&id, &Deadline::after_secs(600)).await.unwrap();

    check_destroyed(api.as_ref(), &[id]).await.unwrap();
    assert!(api.device_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn check_destroyed_names_survivors() {
    let (api, resource) = setup(MemoryApi::new());
    let kept = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();
    let removed = resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();
    resource
        .delete(&removed.state.id, &Deadline::after_secs(600))
        .await
        .unwrap();

    let err = check_destroyed(
        api.as_ref(),
        &[kept.state.id.clone(), removed.state.id.clone()],
    )
    .await
    .unwrap_err();

    match err {
        DeviceError::StillPresent { ids } => assert_eq!(ids, vec![kept.state.id]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn locked_device_cannot_be_destroyed() {
    let (_, resource) = setup(MemoryApi::new());
    let device = resource
        .create(&ubuntu().with_locked(true), &Deadline::after_secs(1200))
        .await
        .unwrap();

    let err = resource
        .delete(&device.state.id, &Deadline::after_secs(600))
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceError::RemoteRejected { .. }));
}

#[tokio::test(start_paused = true)]
async fn list_returns_project_devices() {
    let (_, resource) = setup(MemoryApi::new());
    resource
        .create(&ubuntu(), &Deadline::after_secs(1200))
        .await
        .unwrap();
    let other = DeviceSpec {
        project_id: "project-2".to_string(),
        ..ubuntu()
    };
    resource
        .create(&other, &Deadline::after_secs(1200))
        .await
        .unwrap();

    let devices = resource.list("project-1").await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].project_id, "project-1");
}
