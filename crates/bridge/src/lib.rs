//! Device-side half of the skill bridge.
//!
//! A [`DeviceLink`] is the per-device context: it owns the device model handle,
//! the currently attached [`SkillChannel`] and the notification stream. The
//! [`listener`] accepts controller connections and attaches them, the
//! [`DeviceMethodDispatcher`] turns invocations into verb calls on the channel.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod link;
pub mod listener;
pub mod model;

pub use channel::{SendOutcome, SkillChannel, REMOTE_FAILURE_MESSAGE};
pub use dispatcher::DeviceMethodDispatcher;
pub use error::{ChannelError, DispatchError};
pub use link::DeviceLink;
pub use model::{DeviceModel, InMemoryDeviceModel};
