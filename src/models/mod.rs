pub mod insight;
pub mod origin;
pub mod settings;
pub mod watch;
