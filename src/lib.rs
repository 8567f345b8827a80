pub mod bridge;
pub mod cli;
pub mod common;
pub mod config;
pub mod presentation;
pub mod service;
pub mod transfer;

pub use bridge::envelope::{Envelope, EventKind, TaskId};
pub use bridge::gateway::{BridgeGateway, ExecutorInbox, ExecutorSide, InitiatorSide, Receipt, Report};
pub use config::BridgeConfig;
pub use service::DownloadService;
