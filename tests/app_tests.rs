mod common;

use common::{client_for, setup_mock_server};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::json;
use std::time::Duration;
use todo_tui::app::{App, Screen};
use todo_tui::auth::Session;
use todo_tui::{MemorySessionStore, Mutation, TaskStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn loaded_app(server: &MockServer, token: &str) -> App {
    Mock::given(method("GET"))
        .and(path("/tasks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"_id": "1", "title": "First", "status": "Pendiente"},
                {"_id": "2", "title": "Second", "status": "Pendiente"}
            ]})),
        )
        .mount(server)
        .await;

    let session = Session::new(Box::new(MemorySessionStore::with_token(token)));
    let mut app = App::new(client_for(server), session);
    app.refresh_tasks().await;
    assert_eq!(app.dashboard.tasks().len(), 2);
    app
}

/// Drains completions until `done` holds, giving spawned requests time to finish.
async fn drain_until(app: &mut App, done: impl Fn(&App) -> bool) {
    for _ in 0..100 {
        app.drain_events();
        if done(app) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("background request never settled");
}

#[tokio::test]
async fn test_dispatched_toggle_rolls_back_on_server_error() {
    let server = setup_mock_server().await;
    Mock::given(method("PUT"))
        .and(path("/tasks/1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let mut app = loaded_app(&server, "tok").await;

    app.dispatch(Mutation::Toggle("1".into()));
    assert_eq!(app.dashboard.tasks()[0].status, TaskStatus::Completed);

    drain_until(&mut app, |app| app.dashboard.tasks()[0].status == TaskStatus::Pending).await;
    assert_eq!(app.screen, Screen::Dashboard);
    assert_eq!(app.dashboard.api().token(), Some("tok"));
}

#[tokio::test]
async fn test_dispatched_delete_unauthorized_returns_to_login() {
    let server = setup_mock_server().await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .expect(1)
        .mount(&server)
        .await;
    let mut app = loaded_app(&server, "tok").await;

    app.dispatch(Mutation::Delete("1".into()));
    assert_eq!(app.dashboard.tasks().len(), 1);

    drain_until(&mut app, |app| app.screen == Screen::Login).await;
    assert_eq!(app.dashboard.api().token(), None);
    assert!(app.dashboard.tasks().is_empty());
}

#[tokio::test]
async fn test_late_unauthorized_answer_keeps_new_session() {
    let server = setup_mock_server().await;
    Mock::given(method("PUT"))
        .and(path("/tasks/1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/tasks/2"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
        .mount(&server)
        .await;
    let mut app = loaded_app(&server, "expired").await;

    app.dispatch(Mutation::Toggle("1".into()));
    app.dispatch(Mutation::Toggle("2".into()));
    drain_until(&mut app, |app| app.screen == Screen::Login).await;

    let quit = app
        .handle_input(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
        .await;
    assert!(!quit);
    assert_eq!(app.screen, Screen::Dashboard);
    assert_eq!(app.dashboard.api().token(), Some("fresh"));

    // the delayed answer to the old session's toggle arrives now
    tokio::time::sleep(Duration::from_millis(800)).await;
    app.drain_events();
    assert_eq!(app.screen, Screen::Dashboard);
    assert_eq!(app.dashboard.api().token(), Some("fresh"));
}
