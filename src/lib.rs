//! memhatch - Single-slot message passing over named shared memory
//!
//! Two processes meet on a name: one creates the segment (owner), the other
//! attaches to it. Either side writes a message into the single slot and the
//! peer is woken through a futex-backed notifier and handed the bytes in a
//! callback.
//!
//! # Model
//!
//! - **Single slot**: at most one unread message; a second write before the
//!   first is drained overwrites it (last write wins, no queueing)
//! - **Two-party**: built for one owner and one attacher taking alternating
//!   turns; concurrent writers from both sides are out of contract
//!
//! # Example
//!
//! ```no_run
//! use memhatch::{Endpoint, HatchConfig};
//!
//! let owner = Endpoint::create(HatchConfig::new("greeter"))?;
//! let attacher = Endpoint::attach(HatchConfig::new("greeter"))?;
//!
//! owner.on_message(|payload, info| {
//!     println!("{} got: {}", info.name, String::from_utf8_lossy(payload));
//! })?;
//!
//! attacher.write(b"Hello from Client!")?;
//! # Ok::<(), memhatch::HatchError>(())
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod notify;
pub mod segment;

pub use config::{AccessMode, HatchConfig, DEFAULT_CAPACITY};
pub use endpoint::{Endpoint, EndpointInfo};
pub use error::{HatchError, Result};
pub use notify::Notifier;
pub use segment::{SegmentDescriptor, SharedSegment};
