pub mod history;
pub mod monitor;
