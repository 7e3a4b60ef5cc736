pub mod remote_event;

pub use remote_event::{RemoteEvent, TargetChange, TargetId};
