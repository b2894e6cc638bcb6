pub mod config_cmd;
pub mod conversations;
pub mod onboard;
pub mod run_tool;
pub mod tools;
