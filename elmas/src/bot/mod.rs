//! Chat bot surface: commands, callbacks, admin prompts and reply text

pub mod commands;
pub mod dispatcher;
pub mod messages;
pub mod pending;

pub use commands::{parse_callback, parse_command, BotCommand, CallbackAction};
pub use dispatcher::{BotDispatcher, BotError, BotReply, BotUpdate, Button, MAIN_MENU};
pub use pending::{PendingAction, PendingStore, PromptError, PromptStep};
