use std::{path::PathBuf, sync::Arc};

use url::Url;

use crate::{
    app_settings::AppSettings,
    local_repository::LocalShopRepository,
    rest_repository::RestShopRepository,
    runtime_paths,
    service_registry::{RegistryError, ServiceRegistry},
    shop_repository::{RepositoryError, ShopRepository},
    DATA_MODE_OFFLINE, DATA_MODE_REMOTE, SETTING_API_KEY, SETTING_BASE_URL, SETTING_DATA_MODE,
    SETTING_LOCAL_STORE_PATH,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositorySelectionError {
    #[error("required setting `{0}` is missing")]
    ConfigurationMissing(&'static str),
    #[error("setting `{key}` is invalid: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    #[error("the shop repository has already been built for this process")]
    AlreadyBuilt,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Remote,
    Offline,
}

pub fn data_mode_from_setting(raw: Option<&str>) -> Option<DataMode> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some(DATA_MODE_REMOTE) => Some(DataMode::Remote),
        Some(DATA_MODE_OFFLINE) => Some(DataMode::Offline),
        Some(_) => None,
    }
}

pub(crate) fn parse_base_url(raw_url: &str) -> Result<Url, String> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return Err("empty URL".to_string());
    }

    let parsed = Url::parse(trimmed).map_err(|error| format!("invalid URL: {error}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!(
            "unsupported URL scheme '{scheme}', only http/https are allowed"
        )),
    }
}

/// Builds the process-wide data-access backend and publishes it into the
/// registry. Runs once per process.
pub struct RepositorySelector {
    registry: Arc<ServiceRegistry>,
    app_root_dir: Option<PathBuf>,
}

impl RepositorySelector {
    pub fn new(registry: Arc<ServiceRegistry>, app_root_dir: Option<PathBuf>) -> Self {
        Self {
            registry,
            app_root_dir,
        }
    }

    pub fn build_repository(
        &self,
        settings: &AppSettings,
    ) -> Result<Arc<dyn ShopRepository>, RepositorySelectionError> {
        if self.registry.contains::<dyn ShopRepository>() {
            tracing::error!(
                target: "repository",
                "repository selection invoked twice; keeping the first backend"
            );
            return Err(RepositorySelectionError::AlreadyBuilt);
        }

        let data_mode = data_mode_from_setting(settings.get(SETTING_DATA_MODE)).ok_or_else(|| {
            RepositorySelectionError::InvalidSetting {
                key: SETTING_DATA_MODE,
                reason: format!("expected '{DATA_MODE_REMOTE}' or '{DATA_MODE_OFFLINE}'"),
            }
        })?;

        let repository: Arc<dyn ShopRepository> = match data_mode {
            DataMode::Offline => {
                let store_path = settings
                    .get(SETTING_LOCAL_STORE_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        runtime_paths::default_local_store_path(self.app_root_dir.as_deref())
                    });
                tracing::info!(
                    target: "repository",
                    path = %store_path.display(),
                    "using local shop store"
                );
                Arc::new(LocalShopRepository::new(store_path))
            }
            DataMode::Remote => {
                let base_url = settings
                    .get(SETTING_BASE_URL)
                    .ok_or(RepositorySelectionError::ConfigurationMissing(SETTING_BASE_URL))?;
                let api_key = settings
                    .get(SETTING_API_KEY)
                    .ok_or(RepositorySelectionError::ConfigurationMissing(SETTING_API_KEY))?;
                let base_url = parse_base_url(base_url).map_err(|reason| {
                    RepositorySelectionError::InvalidSetting {
                        key: SETTING_BASE_URL,
                        reason,
                    }
                })?;
                tracing::info!(target: "repository", base_url = %base_url, "using REST shop API");
                Arc::new(RestShopRepository::new(base_url, api_key)?)
            }
        };

        self.registry
            .publish::<dyn ShopRepository>(Arc::clone(&repository))
            .map_err(|error| match error {
                RegistryError::DuplicateRegistration(_) => RepositorySelectionError::AlreadyBuilt,
                other => RepositorySelectionError::Registry(other),
            })?;
        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop_repository::RepositoryBackend;

    fn selector() -> (Arc<ServiceRegistry>, RepositorySelector) {
        let registry = Arc::new(ServiceRegistry::builder().build());
        let selector = RepositorySelector::new(
            Arc::clone(&registry),
            Some(PathBuf::from("/srv/bookshop")),
        );
        (registry, selector)
    }

    #[test]
    fn missing_base_url_fails_without_publishing() {
        let (registry, selector) = selector();
        let settings = AppSettings::from_pairs([(SETTING_API_KEY, "secret")]);

        let error = selector
            .build_repository(&settings)
            .err()
            .expect("missing BaseUrl must fail");
        assert!(matches!(
            error,
            RepositorySelectionError::ConfigurationMissing(SETTING_BASE_URL)
        ));
        assert!(!registry.contains::<dyn ShopRepository>());
    }

    #[test]
    fn missing_api_key_fails_without_publishing() {
        let (registry, selector) = selector();
        let settings = AppSettings::from_pairs([(SETTING_BASE_URL, "https://shop.example/api")]);

        assert!(matches!(
            selector.build_repository(&settings),
            Err(RepositorySelectionError::ConfigurationMissing(SETTING_API_KEY))
        ));
        assert!(!registry.contains::<dyn ShopRepository>());
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let (registry, selector) = selector();
        let settings = AppSettings::from_pairs([
            (SETTING_BASE_URL, "ftp://shop.example"),
            (SETTING_API_KEY, "secret"),
        ]);

        assert!(matches!(
            selector.build_repository(&settings),
            Err(RepositorySelectionError::InvalidSetting {
                key: SETTING_BASE_URL,
                ..
            })
        ));
        assert!(!registry.contains::<dyn ShopRepository>());
    }

    #[test]
    fn remote_settings_publish_rest_repository_once() {
        let (registry, selector) = selector();
        let settings = AppSettings::from_pairs([
            (SETTING_BASE_URL, "https://shop.example/api"),
            (SETTING_API_KEY, "secret"),
        ]);

        let repository = selector.build_repository(&settings).expect("build repository");
        assert_eq!(repository.backend(), RepositoryBackend::Remote);

        let resolved = registry
            .resolve::<dyn ShopRepository>()
            .expect("repository is published");
        assert!(Arc::ptr_eq(&repository, &resolved));

        assert!(matches!(
            selector.build_repository(&settings),
            Err(RepositorySelectionError::AlreadyBuilt)
        ));
    }

    #[test]
    fn offline_mode_builds_local_repository_without_remote_settings() {
        let (registry, selector) = selector();
        let settings = AppSettings::from_pairs([(SETTING_DATA_MODE, "Offline")]);

        let repository = selector.build_repository(&settings).expect("build repository");
        assert_eq!(repository.backend(), RepositoryBackend::Local);
        assert!(registry.contains::<dyn ShopRepository>());
    }

    #[test]
    fn unknown_data_mode_is_rejected() {
        let (_registry, selector) = selector();
        let settings = AppSettings::from_pairs([(SETTING_DATA_MODE, "cloud")]);

        assert!(matches!(
            selector.build_repository(&settings),
            Err(RepositorySelectionError::InvalidSetting {
                key: SETTING_DATA_MODE,
                ..
            })
        ));
    }

    #[test]
    fn data_mode_defaults_to_remote() {
        assert_eq!(data_mode_from_setting(None), Some(DataMode::Remote));
        assert_eq!(data_mode_from_setting(Some("OFFLINE")), Some(DataMode::Offline));
        assert_eq!(data_mode_from_setting(Some("sometimes")), None);
    }
}
