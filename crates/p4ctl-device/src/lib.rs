//! Device session abstraction for a programmable packet-forwarding device.
//!
//! The controller never talks to a transport directly. It programs the device
//! through the [`DeviceSession`] trait and obtains sessions from a
//! [`Connector`], so a real runtime client and the in-process simulator are
//! interchangeable.
//!
//! # Architecture
//!
//! - [`types`]: table handles, match keys, action data and raw digest entries
//! - [`error`]: device error taxonomy
//! - [`session`]: the `Connector` and `DeviceSession` traits
//! - [`sim`]: a simulated device with a tiny data-plane model and fault injection
//!
//! # Example
//!
//! ```ignore
//! use p4ctl_device::{ClientIdentity, Connector, KeyField, SimConnector, SimDevice};
//!
//! let device = SimDevice::builder().table("Ingress.my_table").build();
//! let session = SimConnector::new(device).connect("localhost:50052", ClientIdentity::default()).await?;
//! let table = session.resolve_table("Ingress.my_table").await?;
//! session
//!     .table_write(&table, &[KeyField::exact_u32("hdr.ipv4.src_addr", 0x0a000001)], "Ingress.recirculate", &[])
//!     .await?;
//! ```

pub mod error;
pub mod session;
pub mod sim;
pub mod types;

pub use error::{DeviceError, DeviceResult};
pub use session::{Connector, DeviceSession};
pub use sim::{PacketFate, SimConnector, SimDevice, SimDeviceBuilder, SimPipeline, WrittenEntry};
pub use types::{ClientIdentity, DataField, KeyField, PollFlags, RawDigestEntry, TableHandle};
