/// A chat message classified as a bot command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    /// `/merge` - run one processing cycle now.
    Merge,
    Unknown { verb: String },
}

/// Classifies a message text. Returns `None` for plain chatter so the
/// runner can ignore anything that is not addressed to the bot.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let verb = trimmed.split_whitespace().next().unwrap_or_default();
    // Telegram appends `@botname` in group chats.
    let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();

    match verb.as_str() {
        "/merge" => Some(BotCommand::Merge),
        _ => Some(BotCommand::Unknown { verb }),
    }
}
