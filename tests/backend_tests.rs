mod common;

use common::TestEnv;
use mockito::Matcher;
use serde_json::json;

const TOKEN: &str = "test-token";

fn record(id: &str, status: &str, title: Option<&str>) -> String {
    json!({
        "id": id,
        "filename": "trip.mp4",
        "storage_path": "videos/trip.mp4",
        "title": title,
        "tags": ["travel", "coast"],
        "summary": title.map(|_| "A windy walk along the cliffs."),
        "duration": 125.0,
        "status": status,
        "created_at": "2026-03-01T10:00:00Z"
    })
    .to_string()
}

#[test]
fn list_prints_videos_from_backend() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/videos")
        .match_header("authorization", "Bearer test-token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("status".into(), "ready".into()),
            Matcher::UrlEncoded("limit".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"videos":[{}],"total":12}}"#,
            record("v1", "ready", Some("Trip to the coast"))
        ))
        .create();

    let env = TestEnv::new().with_backend(&server.url()).with_token(TOKEN);
    let output = env.run(&["list", "--status", "ready", "--limit", "5"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "list should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Trip to the coast"));
    assert!(stdout.contains("2:05"));
    assert!(stdout.contains("Showing 1 of 12 videos"));
    mock.assert();
}

#[test]
fn upload_moves_file_then_creates_record_and_starts_processing() {
    let mut server = mockito::Server::new();
    let destination = format!("{}/bucket/videos/trip.mp4", server.url());

    let ticket = server
        .mock("POST", "/videos/upload-url")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(json!({
            "filename": "trip.mp4",
            "content_type": "video/mp4"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "upload_url": destination,
                "storage_path": "videos/trip.mp4",
                "content_type": "video/mp4"
            })
            .to_string(),
        )
        .create();
    let put = server
        .mock("PUT", "/bucket/videos/trip.mp4")
        .match_header("content-type", "video/mp4")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .create();
    let create = server
        .mock("POST", "/videos")
        .match_body(Matcher::PartialJson(json!({
            "filename": "trip.mp4",
            "storage_path": "videos/trip.mp4"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(record("v42", "pending", None))
        .create();
    let process = server
        .mock("POST", "/videos/v42/process")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Processing started","video_id":"v42","status":"processing"}"#)
        .create();

    let env = TestEnv::new().with_backend(&server.url()).with_token(TOKEN);
    let video = env.home().join("trip.mp4");
    std::fs::File::create(&video)
        .and_then(|f| f.set_len(1024 * 1024))
        .expect("create video");

    let output = env.run(&["upload", video.to_str().expect("utf-8 path")]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "upload should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        stderr
    );
    assert!(stdout.contains("Uploaded trip.mp4 as video v42"));
    assert!(stderr.contains("100.0%"));

    ticket.assert();
    put.assert();
    create.assert();
    process.assert();
}

#[test]
fn watch_finished_video_prints_result_without_streaming() {
    let mut server = mockito::Server::new();
    let get = server
        .mock("GET", "/videos/v7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(record("v7", "ready", Some("Trip to the coast")))
        .expect(2)
        .create();
    let stream = server
        .mock("GET", "/videos/v7/progress")
        .expect(0)
        .create();

    let env = TestEnv::new().with_backend(&server.url()).with_token(TOKEN);
    let output = env.run(&["watch", "v7"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "watch should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Ready: Trip to the coast"));
    assert!(stdout.contains("travel, coast"));
    get.assert();
    stream.assert();
}

#[test]
fn watch_follows_progress_stream_to_completion() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/videos/v8")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(record("v8", "processing", None))
        .create();
    server
        .mock("GET", "/videos/v8/progress")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"type\": \"connected\", \"video_id\": \"v8\"}\n\n",
            "data: {\"type\": \"progress\", \"stage\": \"transcribing\", \"message\": \"Transcribing audio...\", \"percent\": 55}\n\n",
            "data: {\"type\": \"progress\", \"stage\": \"failed\", \"message\": \"Processing failed: no audio track\", \"percent\": 0}\n\n",
        ))
        .create();

    let env = TestEnv::new().with_backend(&server.url()).with_token(TOKEN);
    let output = env.run(&["watch", "v8"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "a failed pipeline is reported as failure");
    assert!(stderr.contains("no audio track"), "stderr:\n{}", stderr);
    assert!(stderr.contains("Processing failed for video v8"));
}

#[test]
fn rejected_token_asks_to_sign_in_again() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/videos/tags")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"Invalid or expired token"}"#)
        .create();

    let env = TestEnv::new().with_backend(&server.url()).with_token("expired");
    let output = env.run(&["tags"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Invalid or expired token"));
    assert!(stderr.contains("vidjot login"));
}

#[test]
fn login_stores_token_used_by_later_commands() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/auth")
        .match_body(Matcher::Json(json!({ "password": "hunter2" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-token","token_type":"bearer"}"#)
        .create();
    let tags = server
        .mock("GET", "/videos/tags")
        .match_header("authorization", "Bearer fresh-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"tags":["family","travel"]}"#)
        .create();

    let env = TestEnv::new().with_backend(&server.url());
    let login = env.run(&["login", "--password", "hunter2"]);
    assert!(
        login.status.success(),
        "login should succeed\nstderr:\n{}",
        String::from_utf8_lossy(&login.stderr)
    );

    let output = env.run(&["tags"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("family"));
    assert!(stdout.contains("travel"));
    tags.assert();

    let logout = env.run(&["logout"]);
    assert!(logout.status.success());
    let after = env.run(&["tags"]);
    assert!(String::from_utf8_lossy(&after.stderr).contains("vidjot login"));
}

#[test]
fn doctor_reports_reachable_backend_as_json() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/health").with_status(200).create();

    let env = TestEnv::new().with_backend(&server.url()).with_token(TOKEN);
    let output = env.run(&["doctor", "--json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("doctor emits JSON");
    assert_eq!(report["credentials"], "environment (VIDJOT_TOKEN)");
    let backend = report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|c| c["name"] == "backend"))
        .expect("backend check");
    assert_eq!(backend["status"], "ok");
}
