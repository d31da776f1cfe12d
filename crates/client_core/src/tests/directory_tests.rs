use super::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::domain::MemberId;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct FakeServer {
    requests: Arc<AtomicUsize>,
    saved: Arc<Mutex<Vec<Value>>>,
    update_reply: Arc<Mutex<Option<Value>>>,
}

async fn get_team(
    State(server): State<FakeServer>,
    Path(team_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    server.requests.fetch_add(1, Ordering::SeqCst);
    match team_id.as_str() {
        "42" => (
            StatusCode::OK,
            Json(json!({
                "team": {"team_id": 42, "team_name": "Falcons"},
                "members": [{"member_id": 1, "member_name": "Ana",
                             "check_in": 0, "snacks": 0, "dinner": 0, "check_out": 0}]
            })),
        ),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"oops": true}))),
        _ => (StatusCode::OK, Json(json!({"error": "Team not found"}))),
    }
}

async fn update_members(State(server): State<FakeServer>, Json(body): Json<Value>) -> Json<Value> {
    server.requests.fetch_add(1, Ordering::SeqCst);
    server.saved.lock().await.push(body);
    let reply = server.update_reply.lock().await.clone();
    Json(reply.unwrap_or_else(|| json!({"status": "updated"})))
}

async fn spawn_server(server: FakeServer) -> String {
    let app = Router::new()
        .route("/team/:team_id", get(get_team))
        .route("/update_members", post(update_members))
        .with_state(server);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn update(member_id: i64, check_in: bool) -> MemberUpdate {
    MemberUpdate {
        member_id: MemberId(member_id),
        check_in,
        snacks: false,
        dinner: false,
        check_out: false,
    }
}

#[test]
fn rejects_urls_that_cannot_carry_paths() {
    assert!(matches!(
        HttpTeamDirectory::new("mailto:staff@example.com"),
        Err(DirectoryError::InvalidServerUrl(_))
    ));
    assert!(matches!(
        HttpTeamDirectory::new("not a url"),
        Err(DirectoryError::InvalidServerUrl(_))
    ));
}

#[test]
fn endpoints_keep_base_path_and_escape_team_ids() {
    let directory = HttpTeamDirectory::new("http://example.com/checkin/").expect("directory");
    assert_eq!(
        directory.endpoint(&["team", "a b/c"]).as_str(),
        "http://example.com/checkin/team/a%20b%2Fc"
    );
    let bare = HttpTeamDirectory::new("http://example.com").expect("directory");
    assert_eq!(
        bare.endpoint(&["update_members"]).as_str(),
        "http://example.com/update_members"
    );
}

#[tokio::test]
async fn fetch_team_parses_roster() {
    let url = spawn_server(FakeServer::default()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    let roster = directory
        .fetch_team(&TeamId::new("42"))
        .await
        .expect("roster");
    assert_eq!(roster.team.team_name, "Falcons");
    assert_eq!(roster.members.len(), 1);
    assert_eq!(roster.members[0].member_id, MemberId(1));
    assert!(!roster.members[0].check_in);
}

#[tokio::test]
async fn fetch_team_maps_error_body_to_not_found() {
    let url = spawn_server(FakeServer::default()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    let err = directory
        .fetch_team(&TeamId::new("7"))
        .await
        .expect_err("missing");
    assert!(matches!(err, DirectoryError::TeamNotFound(id) if id == TeamId::new("7")));
}

#[tokio::test]
async fn fetch_team_reports_server_errors() {
    let url = spawn_server(FakeServer::default()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    let err = directory
        .fetch_team(&TeamId::new("broken"))
        .await
        .expect_err("server error");
    assert!(matches!(
        err,
        DirectoryError::UnexpectedStatus(status) if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
}

#[tokio::test]
async fn save_members_posts_integer_flags() {
    let server = FakeServer::default();
    let url = spawn_server(server.clone()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    directory
        .save_members(Some(&TeamId::new("42")), &[update(1, true)])
        .await
        .expect("saved");

    let saved = server.saved.lock().await;
    assert_eq!(
        saved[0],
        json!({"members": [{"member_id": 1, "check_in": 1, "snacks": 0, "dinner": 0, "check_out": 0}]})
    );
}

#[tokio::test]
async fn save_members_without_team_or_members_stays_local() {
    let server = FakeServer::default();
    let url = spawn_server(server.clone()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    let err = directory
        .save_members(None, &[update(1, true)])
        .await
        .expect_err("no team");
    assert!(matches!(err, DirectoryError::NoActiveTeam));

    let err = directory
        .save_members(Some(&TeamId::new("42")), &[])
        .await
        .expect_err("no members");
    assert!(matches!(err, DirectoryError::NoActiveTeam));

    assert_eq!(server.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unconfirmed_update_is_a_failure() {
    let server = FakeServer::default();
    *server.update_reply.lock().await = Some(json!({"status": "queued"}));
    let url = spawn_server(server.clone()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");

    let err = directory
        .save_members(Some(&TeamId::new("42")), &[update(1, false)])
        .await
        .expect_err("not confirmed");
    assert!(matches!(err, DirectoryError::UpdateFailed(reason) if reason.contains("queued")));
}

#[tokio::test]
async fn saving_the_same_snapshot_twice_sends_identical_bodies() {
    let server = FakeServer::default();
    let url = spawn_server(server.clone()).await;
    let directory = HttpTeamDirectory::new(&url).expect("directory");
    let snapshot = vec![update(1, true), update(2, false)];

    for _ in 0..2 {
        directory
            .save_members(Some(&TeamId::new("42")), &snapshot)
            .await
            .expect("saved");
    }

    let saved = server.saved.lock().await;
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0], saved[1]);
}
