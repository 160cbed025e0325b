use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{APP_ROOT_DIR_NAME, APP_ROOT_ENV, DEFAULT_LOCAL_STORE_FILE, SETTINGS_FILE};

pub fn default_app_root_dir() -> Option<PathBuf> {
    if let Ok(root) = env::var(APP_ROOT_ENV) {
        let path = PathBuf::from(root.trim());
        if !path.as_os_str().is_empty() {
            return Some(path);
        }
    }

    home::home_dir().map(|home| home.join(APP_ROOT_DIR_NAME))
}

pub fn settings_file_path(app_root_dir: &Path) -> PathBuf {
    app_root_dir.join(SETTINGS_FILE)
}

pub fn default_local_store_path(app_root_dir: Option<&Path>) -> PathBuf {
    match app_root_dir {
        Some(root) => root.join("data").join(DEFAULT_LOCAL_STORE_FILE),
        None => PathBuf::from(DEFAULT_LOCAL_STORE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_local_store_path_lives_under_data_dir() {
        let root = PathBuf::from("/srv/bookshop");
        assert_eq!(
            default_local_store_path(Some(&root)),
            PathBuf::from("/srv/bookshop/data/shop.json")
        );
    }

    #[test]
    fn default_local_store_path_falls_back_to_relative_file() {
        assert_eq!(default_local_store_path(None), PathBuf::from("shop.json"));
    }

    #[test]
    fn settings_file_path_joins_root() {
        let root = PathBuf::from("/srv/bookshop");
        assert_eq!(
            settings_file_path(&root),
            PathBuf::from("/srv/bookshop/appsettings.json")
        );
    }
}
