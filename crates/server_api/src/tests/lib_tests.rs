use super::*;
use shared::error::ErrorCode;

async fn setup() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext { storage }
}

fn register_request(team_name: &str, members: &[&str]) -> RegisterTeamRequest {
    RegisterTeamRequest {
        team_name: team_name.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

#[tokio::test]
async fn registration_trims_names_and_returns_scannable_payload() {
    let ctx = setup().await;
    let response = register_team(&ctx, register_request("  Falcons ", &["Ana ", " ", "Ben"]))
        .await
        .expect("register");

    let payload = ScanPayload::parse(&response.payload).expect("payload parses");
    assert_eq!(payload.team_id, response.team_id);
    assert_eq!(payload.team_name.as_deref(), Some("Falcons"));
    assert_eq!(payload.members, vec!["Ana".to_string(), "Ben".to_string()]);

    let TeamLookupResponse::Found(roster) = lookup_team(&ctx, &response.team_id)
        .await
        .expect("lookup")
    else {
        panic!("registered team should be found");
    };
    assert_eq!(roster.members.len(), 2);
}

#[tokio::test]
async fn registration_requires_name_and_members() {
    let ctx = setup().await;
    for request in [
        register_request("", &["Ana"]),
        register_request("Falcons", &[]),
        register_request("Falcons", &["  "]),
    ] {
        let err = register_team(&ctx, request).await.expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.message, MISSING_REGISTRATION_FIELDS);
    }
}

#[tokio::test]
async fn lookup_reports_missing_team_in_band() {
    let ctx = setup().await;
    let response = lookup_team(&ctx, &TeamId::new("ghost")).await.expect("lookup");
    assert!(matches!(response, TeamLookupResponse::Missing { error } if error == TEAM_NOT_FOUND));
}

#[tokio::test]
async fn update_members_rejects_empty_and_unknown_updates() {
    let ctx = setup().await;
    let err = update_members(&ctx, &[]).await.expect_err("empty");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = update_members(
        &ctx,
        &[MemberUpdate {
            member_id: shared::domain::MemberId(77),
            check_in: true,
            snacks: false,
            dinner: false,
            check_out: false,
        }],
    )
    .await
    .expect_err("unknown member");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn stats_reflect_saved_updates() {
    let ctx = setup().await;
    let registered = register_team(&ctx, register_request("Owls", &["Kim", "Lee"]))
        .await
        .expect("register");
    let TeamLookupResponse::Found(roster) = lookup_team(&ctx, &registered.team_id)
        .await
        .expect("lookup")
    else {
        panic!("team should exist");
    };

    let updates: Vec<MemberUpdate> = roster
        .members
        .iter()
        .map(|m| MemberUpdate {
            member_id: m.member_id,
            check_in: true,
            snacks: false,
            dinner: true,
            check_out: false,
        })
        .collect();
    let response = update_members(&ctx, &updates).await.expect("update");
    assert_eq!(response.status, shared::protocol::STATUS_UPDATED);

    let stats = attendance_stats(&ctx).await.expect("stats");
    assert_eq!(stats.check_in, 2);
    assert_eq!(stats.dinner, 2);
    assert_eq!(stats.snacks, 0);
}

#[tokio::test]
async fn payload_lookup_requires_existing_team() {
    let ctx = setup().await;
    let err = team_payload(&ctx, &TeamId::new("ghost"))
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);

    let registered = register_team(&ctx, register_request("Owls", &["Kim"]))
        .await
        .expect("register");
    let text = team_payload(&ctx, &registered.team_id).await.expect("payload");
    assert_eq!(
        ScanPayload::parse(&text).expect("parse").team_id,
        registered.team_id
    );
}

#[tokio::test]
async fn delete_team_and_delete_all_clear_listing() {
    let ctx = setup().await;
    let first = register_team(&ctx, register_request("A", &["x"]))
        .await
        .expect("first");
    register_team(&ctx, register_request("B", &["y"]))
        .await
        .expect("second");

    assert!(delete_team(&ctx, &first.team_id).await.expect("delete"));
    assert_eq!(list_teams(&ctx).await.expect("list").len(), 1);

    delete_all(&ctx).await.expect("delete all");
    assert!(list_teams(&ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn badge_png_encodes_the_team_payload() {
    let ctx = setup().await;
    let err = team_badge_png(&ctx, &TeamId::new("ghost"))
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);

    let registered = register_team(&ctx, register_request("Owls", &["Kim"]))
        .await
        .expect("register");
    let png = team_badge_png(&ctx, &registered.team_id)
        .await
        .expect("badge");
    assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    let image = image::load_from_memory(&png).expect("valid png");
    assert!(image.width() > 2 * badge::BORDER_MODULES * badge::MODULE_PIXELS);
}

#[tokio::test]
async fn badge_export_holds_one_png_per_team() {
    let ctx = setup().await;
    let empty = export_badges(&ctx).await.expect("empty export");
    let archive = zip::ZipArchive::new(std::io::Cursor::new(empty)).expect("zip");
    assert_eq!(archive.len(), 0);

    register_team(&ctx, register_request("Owls", &["Kim"]))
        .await
        .expect("owls");
    register_team(&ctx, register_request("Owls", &["Lee"]))
        .await
        .expect("second owls");
    register_team(&ctx, register_request("Hawks/East", &["Max"]))
        .await
        .expect("hawks");

    let bytes = export_badges(&ctx).await.expect("export");
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("zip");
    assert_eq!(archive.len(), 3);
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.contains(&"Hawks_East.png".to_string()));
    assert!(names.contains(&"Owls.png".to_string()));
    assert!(names.iter().any(|name| name.starts_with("Owls (")));

    let mut entry = archive.by_name("Owls.png").expect("entry");
    let mut png = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut png).expect("read entry");
    image::load_from_memory(&png).expect("entry is a png");
}
