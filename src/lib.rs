mod app_constants;

pub mod activation;
pub mod app_runtime;
pub mod app_settings;
pub mod app_types;
pub mod console_shell;
#[cfg(feature = "desktop")]
pub mod desktop_shell;
pub mod launch_context;
pub mod local_repository;
pub mod logging;
pub mod navigation;
pub mod page_registry;
pub mod repository_selector;
pub mod rest_repository;
pub mod runtime_paths;
pub mod service_registry;
pub mod shop_models;
pub mod shop_repository;
pub mod ui_dispatch;
pub mod view_models;

pub use app_constants::*;
pub use logging::{append_desktop_log, append_startup_log};
