//! Tauri webview host. Pages are rendered by the bundled web UI; this module
//! forwards navigation into it, shows failures in native dialogs and routes
//! second-instance launches back to the running process as re-activations.

use std::{env, path::PathBuf, sync::Arc};

use tauri::{AppHandle, Manager, RunEvent};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tokio_util::sync::CancellationToken;

use crate::{
    app_runtime::{self, AppRuntime, StartupError},
    app_types::NavigationRequest,
    append_desktop_log, append_startup_log,
    launch_context::LaunchContext,
    navigation::{Frame, NavigationError},
    page_registry::{page_key_from_name, PageKey, PageViewModel},
    ui_dispatch::{self, ErrorPresenter},
    MAIN_WINDOW_LABEL,
};

#[derive(Default)]
struct DesktopState {
    runtime: tokio::sync::Mutex<Option<AppRuntime>>,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
}

type SharedState = Arc<DesktopState>;

pub(crate) fn page_hash_script(page: PageKey) -> String {
    let hash = format!("#/{}", page.name());
    format!(
        "window.location.hash = {};",
        serde_json::Value::String(hash)
    )
}

struct WebviewFrame {
    app_handle: AppHandle,
}

impl Frame for WebviewFrame {
    fn present(&mut self, page: PageKey, _view_model: Arc<dyn PageViewModel>) {
        let Some(window) = self.app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
            append_desktop_log("present skipped: main window not found");
            return;
        };
        if let Err(error) = window.eval(&page_hash_script(page)) {
            append_desktop_log(&format!("failed to present page {}: {error}", page.name()));
        }
    }
}

struct DialogErrorPresenter {
    app_handle: AppHandle,
}

impl ErrorPresenter for DialogErrorPresenter {
    fn present_error(&self, title: &str, message: &str) {
        self.app_handle
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(|_| {});
    }
}

fn show_main_window(app_handle: &AppHandle) {
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        append_desktop_log("show_main_window skipped: main window not found");
        return;
    };
    if let Err(error) = window.unminimize() {
        append_desktop_log(&format!("failed to unminimize main window: {error}"));
    }
    if let Err(error) = window.show() {
        append_desktop_log(&format!("failed to show main window: {error}"));
    }
    if let Err(error) = window.set_focus() {
        append_desktop_log(&format!("failed to focus main window: {error}"));
    }
}

async fn start_runtime(app_handle: AppHandle, state: SharedState, app_root_dir: Option<PathBuf>) {
    let presenter = DialogErrorPresenter {
        app_handle: app_handle.clone(),
    };
    // Held through activation so bridge commands wait for it.
    let mut slot = state.runtime.lock().await;
    let frame = Box::new(WebviewFrame {
        app_handle: app_handle.clone(),
    });
    let runtime = match app_runtime::start_from_environment(app_root_dir, frame).await {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(target: "startup", "startup failed: {error}");
            ui_dispatch::report_error("startup", &presenter, &error);
            app_handle.exit(1);
            return;
        }
    };
    *state.shutdown.lock() = Some(runtime.shutdown_token());
    let runtime = slot.insert(runtime);

    let context = LaunchContext::from_process_args(env::args());
    if let Err(error) = runtime.activate(&context).await {
        ui_dispatch::report_error("activation", &presenter, &error);
    }
}

fn reactivate(app_handle: &AppHandle, state: SharedState, argv: Vec<String>) {
    show_main_window(app_handle);
    let context = LaunchContext::from_process_args(argv).into_reactivation();
    let presenter = DialogErrorPresenter {
        app_handle: app_handle.clone(),
    };
    tauri::async_runtime::spawn(async move {
        let mut slot = state.runtime.lock().await;
        let Some(runtime) = slot.as_mut() else {
            append_desktop_log("re-activation ignored: runtime is not started");
            return;
        };
        if let Err(error) = runtime.activate(&context).await {
            ui_dispatch::report_error("re-activation", &presenter, &error);
        }
    });
}

async fn submit_navigation(
    app_handle: AppHandle,
    state: &DesktopState,
    label: &str,
    request: impl FnOnce() -> Result<NavigationRequest, NavigationError>,
) -> Result<Option<bool>, String> {
    let presenter = DialogErrorPresenter { app_handle };
    let mut slot = state.runtime.lock().await;
    let runtime = slot
        .as_mut()
        .ok_or_else(|| "BookShop is still starting".to_string())?;
    ui_dispatch::run_command(label, &presenter, || {
        runtime.request_navigation(request()?)
    })
}

#[tauri::command]
async fn desktop_bridge_navigate(
    app_handle: AppHandle,
    state: tauri::State<'_, SharedState>,
    page: String,
    clear_history: Option<bool>,
) -> Result<Option<bool>, String> {
    submit_navigation(app_handle, &state, "bridge navigate", || {
        let page = page_key_from_name(&page).ok_or(NavigationError::UnknownPage(page))?;
        Ok(NavigationRequest::Navigate {
            page,
            parameter: None,
            clear_history: clear_history.unwrap_or(false),
        })
    })
    .await
}

#[tauri::command]
async fn desktop_bridge_go_back(
    app_handle: AppHandle,
    state: tauri::State<'_, SharedState>,
) -> Result<Option<bool>, String> {
    submit_navigation(app_handle, &state, "bridge go back", || {
        Ok(NavigationRequest::GoBack)
    })
    .await
}

pub fn run(app_root_dir: Option<PathBuf>) -> Result<(), StartupError> {
    let state: SharedState = Arc::new(DesktopState::default());
    let reactivation_state = Arc::clone(&state);
    let setup_state = Arc::clone(&state);

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_single_instance::init(move |app_handle, argv, _cwd| {
            append_desktop_log(&format!("second instance launched with {} args", argv.len()));
            reactivate(app_handle, Arc::clone(&reactivation_state), argv);
        }))
        .manage(Arc::clone(&state))
        .invoke_handler(tauri::generate_handler![
            desktop_bridge_navigate,
            desktop_bridge_go_back,
        ])
        .setup(move |app| {
            append_startup_log("webview host ready; starting runtime");
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(start_runtime(app_handle, setup_state, app_root_dir));
            Ok(())
        })
        .build(tauri::generate_context!())
        .map_err(|error| StartupError::Host(error.to_string()))?;

    app.run(move |_app_handle, event| {
        if let RunEvent::Exit = event {
            if let Some(shutdown) = state.shutdown.lock().as_ref() {
                shutdown.cancel();
            }
            append_desktop_log("desktop host exiting");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_hash_script_quotes_the_route() {
        assert_eq!(
            page_hash_script(PageKey::CreateOrder),
            "window.location.hash = \"#/create-order\";"
        );
    }
}
