use std::sync::{atomic::AtomicBool, Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    app_types::AtomicFlagGuard,
    launch_context::{LaunchContext, LaunchKind},
    navigation::NavigationController,
    page_registry::PageKey,
    service_registry::{RegistryError, ServiceRegistry},
};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("activation handler `{handler}` failed: {source}")]
    ActivationFailed {
        handler: &'static str,
        #[source]
        source: HandlerError,
    },
    #[error("activation already ran for this process")]
    AlreadyActivated,
    #[error("activation was cancelled by shutdown")]
    Cancelled,
    #[error(transparent)]
    Service(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    NotStarted,
    Activated,
}

#[async_trait]
pub trait ActivationHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, context: &LaunchContext) -> bool;

    async fn activate(
        &self,
        context: &LaunchContext,
        navigation: &mut NavigationController,
    ) -> Result<(), HandlerError>;
}

pub type HandlerResolver =
    fn(&ServiceRegistry) -> Result<Arc<dyn ActivationHandler>, RegistryError>;

pub fn resolve_handler<H>(registry: &ServiceRegistry) -> Result<Arc<dyn ActivationHandler>, RegistryError>
where
    H: ActivationHandler + 'static,
{
    let handler: Arc<H> = registry.resolve::<H>()?;
    Ok(handler)
}

/// Shows the start page when nothing more specific claims the launch.
pub struct DefaultActivationHandler {
    start_page: PageKey,
}

impl DefaultActivationHandler {
    pub fn new(start_page: PageKey) -> Self {
        Self { start_page }
    }
}

#[async_trait]
impl ActivationHandler for DefaultActivationHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    fn can_handle(&self, _context: &LaunchContext) -> bool {
        true
    }

    async fn activate(
        &self,
        _context: &LaunchContext,
        navigation: &mut NavigationController,
    ) -> Result<(), HandlerError> {
        if let Some(current) = navigation.current_page() {
            tracing::info!(
                target: "activation",
                page = current.name(),
                "window already shows a page; keeping it"
            );
            return Ok(());
        }
        navigation.navigate_to(self.start_page, None, false)?;
        Ok(())
    }
}

/// Handles `--page <name>` launches.
pub struct CommandLineActivationHandler;

#[async_trait]
impl ActivationHandler for CommandLineActivationHandler {
    fn name(&self) -> &'static str {
        "command-line"
    }

    fn can_handle(&self, context: &LaunchContext) -> bool {
        context.kind() == LaunchKind::CommandLine && context.page_argument().is_some()
    }

    async fn activate(
        &self,
        context: &LaunchContext,
        navigation: &mut NavigationController,
    ) -> Result<(), HandlerError> {
        let page = context.page_argument().unwrap_or_default();
        navigation.navigate_by_name(page, None, false)?;
        Ok(())
    }
}

/// Handles `bookshop://<page>` links.
pub struct ProtocolActivationHandler;

pub(crate) fn page_name_from_protocol_uri(uri: &url::Url) -> String {
    match uri.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => uri.path().trim_matches('/').to_string(),
    }
}

#[async_trait]
impl ActivationHandler for ProtocolActivationHandler {
    fn name(&self) -> &'static str {
        "protocol"
    }

    fn can_handle(&self, context: &LaunchContext) -> bool {
        context.kind() == LaunchKind::Protocol
    }

    async fn activate(
        &self,
        context: &LaunchContext,
        navigation: &mut NavigationController,
    ) -> Result<(), HandlerError> {
        let uri = context
            .protocol_uri()
            .ok_or("protocol activation without a bookshop:// link")?;
        let page = page_name_from_protocol_uri(&uri);
        navigation.navigate_by_name(&page, None, false)?;
        Ok(())
    }
}

/// Picks one activation handler per launch, in registration order, falling
/// back to the default handler when none claims the context.
pub struct ActivationPipeline {
    registry: Arc<ServiceRegistry>,
    handlers: Vec<HandlerResolver>,
    default_handler: HandlerResolver,
    state: Mutex<ActivationState>,
    in_flight: AtomicBool,
    shutdown: CancellationToken,
}

impl ActivationPipeline {
    pub fn new(registry: Arc<ServiceRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            handlers: Vec::new(),
            default_handler: resolve_handler::<DefaultActivationHandler>,
            state: Mutex::new(ActivationState::NotStarted),
            in_flight: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Appends a specific handler. Earlier handlers take precedence.
    pub fn with_handler<H>(mut self) -> Self
    where
        H: ActivationHandler + 'static,
    {
        self.handlers.push(resolve_handler::<H>);
        self
    }

    pub fn with_default_handler<H>(mut self) -> Self
    where
        H: ActivationHandler + 'static,
    {
        self.default_handler = resolve_handler::<H>;
        self
    }

    pub fn state(&self) -> ActivationState {
        *self.state.lock()
    }

    pub fn is_activated(&self) -> bool {
        self.state() == ActivationState::Activated
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn run(
        &self,
        context: &LaunchContext,
        navigation: &mut NavigationController,
    ) -> Result<(), ActivationError> {
        let Some(_in_flight) = AtomicFlagGuard::try_set(&self.in_flight) else {
            tracing::error!(target: "activation", "activation requested while another run is in flight");
            return Err(ActivationError::AlreadyActivated);
        };
        if self.is_activated() && !context.is_reactivation() {
            tracing::error!(
                target: "activation",
                "activation requested twice for the same process"
            );
            return Err(ActivationError::AlreadyActivated);
        }

        let handler = self.select_handler(context)?;
        let handler_name = handler.name();
        tracing::info!(
            target: "activation",
            handler = handler_name,
            kind = ?context.kind(),
            reactivation = context.is_reactivation(),
            "dispatching activation"
        );

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ActivationError::Cancelled),
            result = handler.activate(context, navigation) => {
                result.map_err(|source| ActivationError::ActivationFailed {
                    handler: handler_name,
                    source,
                })
            }
        };

        *self.state.lock() = ActivationState::Activated;
        match &outcome {
            Ok(()) => tracing::info!(target: "activation", handler = handler_name, "activation completed"),
            Err(error) => tracing::error!(target: "activation", handler = handler_name, "{error}"),
        }
        outcome
    }

    fn select_handler(
        &self,
        context: &LaunchContext,
    ) -> Result<Arc<dyn ActivationHandler>, RegistryError> {
        for resolve in &self.handlers {
            let handler = resolve(&self.registry)?;
            if handler.can_handle(context) {
                return Ok(handler);
            }
            tracing::debug!(target: "activation", handler = handler.name(), "handler declined");
        }
        (self.default_handler)(&self.registry)
    }
}
