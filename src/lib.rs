pub mod api;
pub mod core;
pub mod monitoring;
pub mod operator;
pub mod profiles;
pub mod scanner;
pub mod vault;
