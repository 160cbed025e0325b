pub const APP_ROOT_ENV: &str = "BOOKSHOP_ROOT";
pub const APP_ROOT_DIR_NAME: &str = ".bookshop";
pub const SETTINGS_FILE: &str = "appsettings.json";
pub const DESKTOP_LOG_FILE: &str = "bookshop-desktop.log";
pub const LOG_FILTER_ENV: &str = "BOOKSHOP_LOG";
pub const DEFAULT_LOCAL_STORE_FILE: &str = "shop.json";

pub const SETTING_BASE_URL: &str = "BaseUrl";
pub const SETTING_API_KEY: &str = "apikey";
pub const SETTING_DATA_MODE: &str = "DataMode";
pub const SETTING_LOCAL_STORE_PATH: &str = "LocalStorePath";
pub const SETTING_START_PAGE: &str = "StartPage";

pub const DATA_MODE_OFFLINE: &str = "offline";
pub const DATA_MODE_REMOTE: &str = "remote";

/// Environment overrides, applied on top of `appsettings.json`.
pub const SETTING_ENV_OVERRIDES: [(&str, &str); 5] = [
    (SETTING_BASE_URL, "BOOKSHOP_BASE_URL"),
    (SETTING_API_KEY, "BOOKSHOP_API_KEY"),
    (SETTING_DATA_MODE, "BOOKSHOP_DATA_MODE"),
    (SETTING_LOCAL_STORE_PATH, "BOOKSHOP_LOCAL_STORE"),
    (SETTING_START_PAGE, "BOOKSHOP_START_PAGE"),
];

pub const PROTOCOL_SCHEME: &str = "bookshop";
pub const PAGE_ARGUMENT_FLAG: &str = "--page";
pub const MAIN_WINDOW_LABEL: &str = "main";
pub const UNEXPECTED_ERROR_TITLE: &str = "Unexpected error!";
pub const UNEXPECTED_ERROR_MESSAGE: &str =
    "Something went wrong. The problem has been logged and BookShop will keep running.";

pub const REST_REQUEST_TIMEOUT_SECS: u64 = 15;
