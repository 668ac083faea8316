use crate::app::App;
use crate::error::AppError;
use crate::event::Event;

/// Apply one event to the session.
pub async fn handle_event(app: &mut App, event: Event) {
    match event {
        Event::Refresh => {
            if let Err(e) = app.refresh().await {
                report(app, "refresh failed", &e);
            }
        }
        Event::Select(path) => {
            if let Err(e) = app.select(&path).await {
                report(app, "select failed", &e);
            }
        }
        Event::Toggle(path) => {
            if app.toggle(&path).await.is_none() {
                tracing::debug!(path = %path, "toggle ignored: not a directory");
            }
        }
        Event::Search(query) => app.set_search_query(&query),
        Event::SearchNext => app.search_next(),
        Event::SearchPrevious => app.search_previous(),
        Event::Watch {
            kind,
            session,
            message,
        } => app.handle_watch(kind, session, message).await,
        Event::WatchClosed {
            kind,
            session,
            error,
        } => app.handle_watch_closed(kind, session, error),
        Event::Quit => {
            app.close_watches();
            app.quit();
        }
    }
}

fn report(app: &mut App, what: &str, error: &AppError) {
    if error.is_user_visible() {
        tracing::error!(error = %error, "{what}");
    } else {
        tracing::warn!(error = %error, "{what}");
    }
    app.set_status_message(error.to_string());
}
