pub mod clock;
pub mod config;
pub mod dom;
pub mod guard;
pub mod state;
pub mod storage;
