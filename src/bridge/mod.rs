pub mod envelope;
pub mod error;
pub mod gateway;

pub use envelope::{BridgeMessage, Envelope, EventKind, TaskId};
pub use error::BridgeError;
pub use gateway::{BridgeGateway, EnvelopeHandler, ExecutorInbox, ExecutorSide, InitiatorSide, Receipt, Report};
