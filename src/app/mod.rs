pub mod ports;
pub mod publisher;

pub use ports::ObjectStorePort;
pub use publisher::{PublishReceipt, Publisher};
