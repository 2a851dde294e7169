pub mod insight_commands;
pub mod monitor_commands;
pub mod settings_commands;
