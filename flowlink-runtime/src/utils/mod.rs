pub mod date_time;
pub mod process;
pub mod thread;
