//! Declarative lifecycle engine for bare metal devices.
//!
//! This crate validates a desired device spec, submits it to a bare metal
//! provisioning API, waits for the device to become active, reconciles the
//! remote record back into a local attribute set, and tears devices down.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use packet_metal::providers::packet::PacketClient;
//! use packet_metal::{Deadline, DeviceResource, DeviceSpec, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = Arc::new(PacketClient::new("auth_token")?);
//!     let resource = DeviceResource::new(api, &EngineConfig::default());
//!
//!     let spec = DeviceSpec::new(
//!         "test-device", "baremetal_0", "sjc1", "ubuntu_16_04", "hourly", "project_id",
//!     );
//!
//!     // Validate, submit and wait for `active`
//!     let device = resource.create(&spec, &Deadline::after_secs(1200)).await?;
//!
//!     // Later: read back and tear down
//!     resource.read(&device.state.id, Some(&device.state)).await?;
//!     resource.delete(&device.state.id, &Deadline::after_secs(600)).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod providers;
pub mod reconcile;
pub mod resource;
pub mod teardown;
pub mod validate;
pub mod wait;

pub use config::EngineConfig;
pub use device::{DeviceSpec, DeviceState, CUSTOM_IPXE};
pub use error::{DeviceError, WaitPhase};
pub use lifecycle::{Lifecycle, LifecyclePhase, Provisioned, Provisioner};
pub use providers::{ApiError, ApiErrorKind, DeviceApi, DeviceRecord, DeviceStatus};
pub use reconcile::{Drift, Reconciler, Refresh};
pub use resource::DeviceResource;
pub use teardown::{check_destroyed, Teardown};
pub use validate::{validate, validate_all, ValidationError, ValidationErrorKind};
pub use wait::Deadline;
