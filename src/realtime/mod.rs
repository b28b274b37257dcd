pub mod presence;
pub mod protocol;

pub use presence::PresenceTracker;
pub use protocol::{ClientEvent, ServerEvent};
