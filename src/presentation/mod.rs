pub mod adapter;
pub mod channel;
pub mod error;
pub mod memory;
pub mod surface;
pub mod terminal;

pub use adapter::PresentationAdapter;
pub use channel::{Importance, NotificationChannel};
pub use error::PresentationError;
pub use memory::MemorySurface;
pub use surface::{Notification, NotificationSurface, ProgressMode, TapAction};
pub use terminal::TerminalSurface;
