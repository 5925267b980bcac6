pub mod telegram;

/// A chat message received by one of the bots, reduced to the fields the
/// webhook payload carries. Lives only for one forward attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Empty for non-text messages (photos, stickers, ...)
    pub text: String,
    pub chat_id: i64,
    /// Empty when the sender has no public username
    pub from_username: String,
    pub from_first_name: String,
}
