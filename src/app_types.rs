use std::sync::atomic::{AtomicBool, Ordering};

use crate::page_registry::{NavigationParameter, PageKey};

/// A navigation the user asked for, held back until activation completes.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationRequest {
    Navigate {
        page: PageKey,
        parameter: Option<NavigationParameter>,
        clear_history: bool,
    },
    GoBack,
}

impl NavigationRequest {
    pub fn navigate(page: PageKey) -> Self {
        Self::Navigate {
            page,
            parameter: None,
            clear_history: false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Navigate { page, .. } => page.name(),
            Self::GoBack => "back",
        }
    }
}

pub(crate) struct AtomicFlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AtomicFlagGuard<'a> {
    pub(crate) fn try_set(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag })
    }
}

impl Drop for AtomicFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
