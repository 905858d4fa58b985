//! Provider abstractions for bare metal device APIs.

pub mod memory;
pub mod packet;
mod traits;

pub use traits::{
    ApiError, ApiErrorKind, BillingCycle, CreateDeviceRequest, DeviceApi, DeviceRecord,
    DeviceStatus, IpAssignment, ParseBillingCycleError, UpdateDeviceRequest,
};
