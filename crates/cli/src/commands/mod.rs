pub mod config_cmd;
pub mod events;
pub mod run;
pub mod terminal;
pub mod tools;
