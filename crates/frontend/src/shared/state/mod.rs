pub mod cache_manager;
pub mod collector;
pub mod context;
pub mod form_state_manager;
pub mod navigation;
pub mod restorer;
pub mod row_factory;
pub mod session;
