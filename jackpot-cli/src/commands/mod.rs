pub mod config;
pub mod history;
pub mod keeper;
pub mod round;

pub use config::{handle_config_command, ConfigCommands};
pub use history::{handle_history_command, HistoryCommands};
pub use keeper::{handle_keeper_command, KeeperCommands};
pub use round::{handle_round_command, RoundCommands};
