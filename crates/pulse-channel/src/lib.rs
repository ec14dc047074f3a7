pub mod channel;
pub mod error;

pub use channel::{
    ChannelConfig, ChannelStatus, RealtimeChannel, ReconnectConfig, Subscription,
};
pub use error::ChannelError;
