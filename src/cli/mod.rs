pub mod app;
pub mod browser;
pub mod capture;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod perform;
pub mod ping;
pub mod run;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
