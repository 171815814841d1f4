pub mod models;
pub mod pii;

pub use models::events::PlatformEvent;
pub use pii::Masked;
