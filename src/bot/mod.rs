/// Per-chat `/crypto` cooldown
pub mod cooldown;
/// Command, callback and address handlers
pub mod handlers;
/// Inline conversion queries
pub mod inline;
/// Telegram calls with retry
pub mod resilient;
/// TON address detection
pub mod scanner;
/// Shared handler state
pub mod state;
/// Message texts and keyboards
pub mod views;

pub use cooldown::CommandCooldown;
pub use state::AppState;
