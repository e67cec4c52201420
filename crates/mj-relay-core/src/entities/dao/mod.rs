pub mod channel;
pub mod log;
pub mod task;
pub mod token;

pub use channel::ChannelRecord;
pub use log::ConsumeLog;
pub use task::MjTask;
pub use token::{TokenRecord, UserRecord};
