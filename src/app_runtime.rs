use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use tokio_util::sync::CancellationToken;

use crate::{
    activation::{
        ActivationError, ActivationPipeline, ActivationState, CommandLineActivationHandler,
        DefaultActivationHandler, ProtocolActivationHandler,
    },
    app_settings::{AppSettings, SettingsError},
    app_types::NavigationRequest,
    append_startup_log,
    launch_context::LaunchContext,
    logging,
    navigation::{Frame, NavigationController, NavigationError},
    page_registry::{page_key_from_name, resolve_view_model, PageKey, PageRegistry, ParameterKind},
    repository_selector::{RepositorySelectionError, RepositorySelector},
    runtime_paths,
    service_registry::{RegistryError, ServiceRegistry},
    view_models::{
        AddProductViewModel, CategoriesViewModel, CreateOrderViewModel, DashboardViewModel,
        LoginViewModel, OrdersViewModel, ProductDetailViewModel, ProductsViewModel,
        SettingsViewModel,
    },
    DESKTOP_LOG_FILE, SETTING_START_PAGE,
};

pub const DEFAULT_START_PAGE: PageKey = PageKey::Login;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to register services: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to select the shop repository: {0}")]
    Repository(#[from] RepositorySelectionError),
    #[error("activation failed: {0}")]
    Activation(#[from] ActivationError),
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("host failed: {0}")]
    Host(String),
}

pub fn start_page_from_settings(settings: &AppSettings) -> PageKey {
    let Some(raw) = settings.get(SETTING_START_PAGE) else {
        return DEFAULT_START_PAGE;
    };
    page_key_from_name(raw).unwrap_or_else(|| {
        tracing::warn!(
            target: "startup",
            start_page = raw,
            "unknown start page; falling back to {}",
            DEFAULT_START_PAGE.name()
        );
        DEFAULT_START_PAGE
    })
}

/// Registers everything the activation and navigation layers resolve. The
/// repository handle is published later by [`RepositorySelector`].
pub fn configure_services(settings: Arc<AppSettings>) -> Result<ServiceRegistry, RegistryError> {
    let start_page = start_page_from_settings(&settings);
    let mut builder = ServiceRegistry::builder();
    builder
        .register_singleton::<AppSettings, _>(move |_| Ok(Arc::clone(&settings)))?
        .register_transient::<DefaultActivationHandler, _>(move |_| {
            Ok(Arc::new(DefaultActivationHandler::new(start_page)))
        })?
        .register_transient::<CommandLineActivationHandler, _>(|_| {
            Ok(Arc::new(CommandLineActivationHandler))
        })?
        .register_transient::<ProtocolActivationHandler, _>(|_| {
            Ok(Arc::new(ProtocolActivationHandler))
        })?
        .register_transient::<LoginViewModel, _>(|registry| {
            LoginViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<DashboardViewModel, _>(|registry| {
            DashboardViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<ProductsViewModel, _>(|registry| {
            ProductsViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<ProductDetailViewModel, _>(|registry| {
            ProductDetailViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<AddProductViewModel, _>(|registry| {
            AddProductViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<CategoriesViewModel, _>(|registry| {
            CategoriesViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<OrdersViewModel, _>(|registry| {
            OrdersViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<CreateOrderViewModel, _>(|registry| {
            CreateOrderViewModel::from_registry(registry).map(Arc::new)
        })?
        .register_transient::<SettingsViewModel, _>(|registry| {
            SettingsViewModel::from_registry(registry).map(Arc::new)
        })?;
    Ok(builder.build())
}

pub fn configure_pages() -> PageRegistry {
    let mut pages = PageRegistry::new();
    pages
        .register(PageKey::Login, None, resolve_view_model::<LoginViewModel>)
        .register(
            PageKey::Dashboard,
            None,
            resolve_view_model::<DashboardViewModel>,
        )
        .register(
            PageKey::Products,
            Some(ParameterKind::Category),
            resolve_view_model::<ProductsViewModel>,
        )
        .register(
            PageKey::ProductDetail,
            Some(ParameterKind::Product),
            resolve_view_model::<ProductDetailViewModel>,
        )
        .register(
            PageKey::AddProduct,
            Some(ParameterKind::Products),
            resolve_view_model::<AddProductViewModel>,
        )
        .register(
            PageKey::Categories,
            None,
            resolve_view_model::<CategoriesViewModel>,
        )
        .register(PageKey::Orders, None, resolve_view_model::<OrdersViewModel>)
        .register(
            PageKey::CreateOrder,
            Some(ParameterKind::Order),
            resolve_view_model::<CreateOrderViewModel>,
        )
        .register(
            PageKey::Settings,
            None,
            resolve_view_model::<SettingsViewModel>,
        );
    pages
}

pub async fn load_settings(app_root_dir: Option<&Path>) -> Result<AppSettings, SettingsError> {
    let settings = match app_root_dir {
        Some(root) => AppSettings::load(&runtime_paths::settings_file_path(root)).await?,
        None => {
            tracing::warn!(target: "startup", "no app root directory; using environment settings only");
            AppSettings::default()
        }
    };
    Ok(settings.with_env_overrides())
}

/// Process-level wiring: registry, repository, activation and navigation.
pub struct AppRuntime {
    registry: Arc<ServiceRegistry>,
    pipeline: ActivationPipeline,
    navigation: NavigationController,
    pending_navigations: VecDeque<NavigationRequest>,
    shutdown: CancellationToken,
}

impl AppRuntime {
    pub fn start(
        settings: AppSettings,
        app_root_dir: Option<PathBuf>,
        frame: Box<dyn Frame>,
    ) -> Result<Self, StartupError> {
        let settings = Arc::new(settings);
        let registry = Arc::new(configure_services(Arc::clone(&settings))?);

        let repository = RepositorySelector::new(Arc::clone(&registry), app_root_dir)
            .build_repository(&settings)?;
        append_startup_log(&format!(
            "shop repository ready: backend={}",
            repository.backend().as_str()
        ));

        let shutdown = CancellationToken::new();
        let pipeline = ActivationPipeline::new(Arc::clone(&registry), shutdown.clone())
            .with_handler::<ProtocolActivationHandler>()
            .with_handler::<CommandLineActivationHandler>();
        let navigation =
            NavigationController::new(Arc::clone(&registry), Arc::new(configure_pages()), frame);

        Ok(Self {
            registry,
            pipeline,
            navigation,
            pending_navigations: VecDeque::new(),
            shutdown,
        })
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.navigation
    }

    pub fn activation_state(&self) -> ActivationState {
        self.pipeline.state()
    }

    pub fn pending_navigations(&self) -> usize {
        self.pending_navigations.len()
    }

    /// Runs the activation pipeline, then replays user navigations that
    /// arrived while it was pending.
    pub async fn activate(&mut self, context: &LaunchContext) -> Result<(), ActivationError> {
        let outcome = self.pipeline.run(context, &mut self.navigation).await;
        if self.pipeline.is_activated() {
            self.drain_pending_navigations();
        }
        outcome
    }

    /// Performs a user navigation, or queues it until activation completes.
    /// Returns `Ok(None)` when the request was queued.
    pub fn request_navigation(
        &mut self,
        request: NavigationRequest,
    ) -> Result<Option<bool>, NavigationError> {
        if !self.pipeline.is_activated() {
            tracing::debug!(
                target: "navigation",
                request = request.label(),
                "queued until activation completes"
            );
            self.pending_navigations.push_back(request);
            return Ok(None);
        }
        self.apply(request).map(Some)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            append_startup_log("shutdown requested; abandoning pending work");
            self.shutdown.cancel();
        }
    }

    fn apply(&mut self, request: NavigationRequest) -> Result<bool, NavigationError> {
        match request {
            NavigationRequest::Navigate {
                page,
                parameter,
                clear_history,
            } => self.navigation.navigate_to(page, parameter, clear_history),
            NavigationRequest::GoBack => self.navigation.go_back(),
        }
    }

    fn drain_pending_navigations(&mut self) {
        while let Some(request) = self.pending_navigations.pop_front() {
            let label = request.label();
            if let Err(error) = self.apply(request) {
                tracing::warn!(
                    target: "navigation",
                    request = label,
                    "queued navigation failed: {error}"
                );
            }
        }
    }
}

/// Loads settings for `app_root_dir` and wires a runtime around `frame`.
pub async fn start_from_environment(
    app_root_dir: Option<PathBuf>,
    frame: Box<dyn Frame>,
) -> Result<AppRuntime, StartupError> {
    let settings = load_settings(app_root_dir.as_deref()).await?;
    append_startup_log(&format!("settings loaded: {} keys", settings.len()));
    AppRuntime::start(settings, app_root_dir, frame)
}

pub fn run() -> ExitCode {
    let app_root_dir = runtime_paths::default_app_root_dir();
    let log_path = logging::resolve_desktop_log_path(app_root_dir.clone(), DESKTOP_LOG_FILE);
    if let Err(error) = logging::init_desktop_logging(&log_path) {
        eprintln!("{error}");
    }
    append_startup_log("desktop process starting");
    append_startup_log(&format!("desktop log path: {}", log_path.display()));

    match run_host(app_root_dir) {
        Ok(()) => {
            append_startup_log("desktop process exiting");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(target: "startup", "startup failed: {error}");
            eprintln!("BookShop could not start: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "desktop")]
fn run_host(app_root_dir: Option<PathBuf>) -> Result<(), StartupError> {
    crate::desktop_shell::run(app_root_dir)
}

#[cfg(not(feature = "desktop"))]
fn run_host(app_root_dir: Option<PathBuf>) -> Result<(), StartupError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;
    runtime.block_on(crate::console_shell::run(app_root_dir))
}
