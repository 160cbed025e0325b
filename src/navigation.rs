use std::sync::Arc;

use crate::{
    page_registry::{
        page_key_from_name, NavigationParameter, PageKey, PageRegistry, PageViewModel,
        ParameterKind,
    },
    service_registry::{RegistryError, ServiceRegistry},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    #[error("no page is registered under `{0}`")]
    UnknownPage(String),
    #[error("page `{page}` expects {expected:?} but received {received:?}")]
    ParameterMismatch {
        page: &'static str,
        expected: Option<ParameterKind>,
        received: ParameterKind,
    },
    #[error(transparent)]
    Service(#[from] RegistryError),
}

/// Host surface that displays the current page.
pub trait Frame: Send {
    fn present(&mut self, page: PageKey, view_model: Arc<dyn PageViewModel>);
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRecord {
    pub page: PageKey,
    pub parameter: Option<NavigationParameter>,
}

struct ActivePage {
    record: NavigationRecord,
    view_model: Arc<dyn PageViewModel>,
}

/// Owns the current page and the back-stack. The current page is never on
/// the back-stack.
pub struct NavigationController {
    registry: Arc<ServiceRegistry>,
    pages: Arc<PageRegistry>,
    frame: Box<dyn Frame>,
    current: Option<ActivePage>,
    back_stack: Vec<NavigationRecord>,
}

impl NavigationController {
    pub fn new(registry: Arc<ServiceRegistry>, pages: Arc<PageRegistry>, frame: Box<dyn Frame>) -> Self {
        Self {
            registry,
            pages,
            frame,
            current: None,
            back_stack: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&NavigationRecord> {
        self.current.as_ref().map(|active| &active.record)
    }

    pub fn current_page(&self) -> Option<PageKey> {
        self.current().map(|record| record.page)
    }

    pub fn current_view_model(&self) -> Option<Arc<dyn PageViewModel>> {
        self.current
            .as_ref()
            .map(|active| Arc::clone(&active.view_model))
    }

    pub fn can_go_back(&self) -> bool {
        !self.back_stack.is_empty()
    }

    pub fn back_stack_len(&self) -> usize {
        self.back_stack.len()
    }

    pub fn navigate_by_name(
        &mut self,
        name: &str,
        parameter: Option<NavigationParameter>,
        clear_history: bool,
    ) -> Result<bool, NavigationError> {
        let page =
            page_key_from_name(name).ok_or_else(|| NavigationError::UnknownPage(name.to_string()))?;
        self.navigate_to(page, parameter, clear_history)
    }

    /// Moves to `page`. Returns `Ok(false)` when `page` with the same
    /// parameter is already current; `clear_history` still empties the
    /// back-stack in that case.
    pub fn navigate_to(
        &mut self,
        page: PageKey,
        parameter: Option<NavigationParameter>,
        clear_history: bool,
    ) -> Result<bool, NavigationError> {
        let descriptor = self
            .pages
            .descriptor(page)
            .ok_or_else(|| NavigationError::UnknownPage(page.name().to_string()))?;

        if let Some(received) = parameter.as_ref().map(NavigationParameter::kind) {
            if descriptor.accepts() != Some(received) {
                tracing::warn!(
                    target: "navigation",
                    page = page.name(),
                    ?received,
                    "navigation parameter rejected"
                );
                return Err(NavigationError::ParameterMismatch {
                    page: page.name(),
                    expected: descriptor.accepts(),
                    received,
                });
            }
        }

        if self
            .current()
            .is_some_and(|current| current.page == page && current.parameter == parameter)
        {
            if clear_history {
                self.back_stack.clear();
            }
            tracing::debug!(target: "navigation", page = page.name(), clear_history, "already on page");
            return Ok(false);
        }

        let view_model = descriptor.resolve(&self.registry)?;

        if clear_history {
            self.back_stack.clear();
        }
        if let Some(previous) = self.current.take() {
            if let Some(aware) = previous.view_model.as_navigation_aware() {
                aware.on_navigated_from();
            }
            if !clear_history {
                self.back_stack.push(previous.record);
            }
        }

        self.enter(NavigationRecord { page, parameter }, view_model);
        tracing::info!(
            target: "navigation",
            page = page.name(),
            clear_history,
            back_stack = self.back_stack.len(),
            "navigated"
        );
        Ok(true)
    }

    /// Returns to the previous page, redelivering its stored parameter.
    /// Returns `Ok(false)` when there is nothing to go back to.
    pub fn go_back(&mut self) -> Result<bool, NavigationError> {
        let Some(record) = self.back_stack.pop() else {
            return Ok(false);
        };

        let resolved = match self.pages.descriptor(record.page) {
            Some(descriptor) => descriptor.resolve(&self.registry).map_err(NavigationError::from),
            None => Err(NavigationError::UnknownPage(record.page.name().to_string())),
        };
        let view_model = match resolved {
            Ok(view_model) => view_model,
            Err(error) => {
                tracing::error!(
                    target: "navigation",
                    page = record.page.name(),
                    "go back failed: {error}"
                );
                self.back_stack.push(record);
                return Err(error);
            }
        };

        if let Some(previous) = self.current.take() {
            if let Some(aware) = previous.view_model.as_navigation_aware() {
                aware.on_navigated_from();
            }
        }

        let page = record.page;
        self.enter(record, view_model);
        tracing::info!(
            target: "navigation",
            page = page.name(),
            back_stack = self.back_stack.len(),
            "navigated back"
        );
        Ok(true)
    }

    fn enter(&mut self, record: NavigationRecord, view_model: Arc<dyn PageViewModel>) {
        if let Some(aware) = view_model.as_navigation_aware() {
            aware.on_navigated_to(record.parameter.as_ref());
        }
        self.frame.present(record.page, Arc::clone(&view_model));
        self.current = Some(ActivePage { record, view_model });
    }
}
