#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("outbound queue full")]
    QueueFull,

    #[error("channel closed")]
    Closed,
}
