//! Packet bare metal provider.
//!
//! Implements the [`DeviceApi`](crate::providers::DeviceApi) trait for the
//! Packet REST API (`/projects/{id}/devices`, `/devices/{id}`).

mod client;
mod models;

pub use client::{PacketClient, API_BASE_URL};
