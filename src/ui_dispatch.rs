use std::{
    any::Any,
    error::Error,
    panic::{self, AssertUnwindSafe},
};

use crate::{UNEXPECTED_ERROR_MESSAGE, UNEXPECTED_ERROR_TITLE};

/// Surface that tells the user something went wrong, without technical detail.
pub trait ErrorPresenter {
    fn present_error(&self, title: &str, message: &str);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

/// Runs a UI-thread task, turning a panic into a logged error plus a dialog.
/// Returns `None` when the task panicked; the caller keeps running.
pub fn run_guarded<T, F>(label: &str, presenter: &dyn ErrorPresenter, task: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                target: "desktop",
                task = label,
                "unhandled panic on UI thread: {}",
                panic_message(payload.as_ref())
            );
            presenter.present_error(UNEXPECTED_ERROR_TITLE, UNEXPECTED_ERROR_MESSAGE);
            None
        }
    }
}

/// Logs an error that reached the top of a UI action and shows the generic
/// message.
pub fn report_error(label: &str, presenter: &dyn ErrorPresenter, error: &dyn Error) {
    let mut detail = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    tracing::error!(target: "desktop", task = label, "{detail}");
    presenter.present_error(UNEXPECTED_ERROR_TITLE, UNEXPECTED_ERROR_MESSAGE);
}

/// Guards the body of a command invoked by the web UI. Panics and errors go
/// through the same log-and-dialog path as UI tasks; the caller receives a
/// short failure string to hand back over the bridge.
pub fn run_command<T, E, F>(label: &str, presenter: &dyn ErrorPresenter, task: F) -> Result<T, String>
where
    E: Error,
    F: FnOnce() -> Result<T, E>,
{
    match run_guarded(label, presenter, task) {
        Some(Ok(value)) => Ok(value),
        Some(Err(error)) => {
            report_error(label, presenter, &error);
            Err(error.to_string())
        }
        None => Err(UNEXPECTED_ERROR_MESSAGE.to_string()),
    }
}
