//! HTTP client tests against a local tiny_http appliance.

mod common;

use std::net::TcpListener;
use std::time::Duration;

use common::{healthy_appliance, MockServer, RecordedRequest};
use spx_restore::appliance::{
    Appliance, ApplianceError, ClientConfig, HttpAppliance, JobState, MountRequest,
    SnapshotTime, UnmountRequest,
};
use spx_restore::restore::{RestoreOptions, RestoreTester};
use tempfile::TempDir;

fn login(server: &MockServer) -> HttpAppliance {
    HttpAppliance::authenticate(ClientConfig::new(server.base_url.clone()), "admin", "secret")
        .unwrap()
}

fn find<'a>(requests: &'a [RecordedRequest], method: &str, url: &str) -> &'a RecordedRequest {
    requests
        .iter()
        .find(|r| r.method == method && r.url == url)
        .unwrap_or_else(|| panic!("no {method} {url} in {requests:?}"))
}

#[test]
fn test_login_posts_credentials_and_uses_token() {
    let server = MockServer::start(healthy_appliance(&["C:"]));
    let appliance = login(&server);

    let images = appliance.list_images().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].drive_letter, "C:");
    assert_eq!(images[0].filename, "C:-image.spf");

    let requests = server.requests();
    let login = find(&requests, "POST", "/spx/auth/login");
    let body: serde_json::Value = serde_json::from_str(&login.body).unwrap();
    assert_eq!(body["username"], "admin");
    assert_eq!(body["password"], "secret");
    assert!(login.authorization.is_none());

    let list = find(&requests, "GET", "/spx/v1/image");
    assert_eq!(list.authorization.as_deref(), Some("Token t0k3n"));
}

#[test]
fn test_login_rejected_makes_no_further_requests() {
    let server = MockServer::start(Box::new(|_: &RecordedRequest| {
        (401, "bad credentials".to_string())
    }));

    let err = HttpAppliance::authenticate(
        ClientConfig::new(server.base_url.clone()),
        "admin",
        "wrong",
    )
    .unwrap_err();

    match &err {
        ApplianceError::AuthRejected { status, body } => {
            assert_eq!(*status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("Expected AuthRejected, got {:?}", other),
    }
    assert!(err.is_auth_failure());
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_login_other_success_status_is_rejected() {
    let server = MockServer::start(Box::new(|_: &RecordedRequest| (204, String::new())));

    let err = HttpAppliance::authenticate(
        ClientConfig::new(server.base_url.clone()),
        "admin",
        "secret",
    )
    .unwrap_err();

    assert!(matches!(err, ApplianceError::AuthRejected { status: 204, .. }));
}

#[test]
fn test_login_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ClientConfig::new(format!("http://127.0.0.1:{port}/spx"))
        .with_request_timeout(Duration::from_secs(2));

    let err = HttpAppliance::authenticate(config, "admin", "secret").unwrap_err();

    match err {
        ApplianceError::Unreachable { url, .. } => {
            assert_eq!(url, format!("http://127.0.0.1:{port}/spx/auth/login"));
        }
        other => panic!("Expected Unreachable, got {:?}", other),
    }
}

#[test]
fn test_login_without_token_is_schema_error() {
    let server = MockServer::start(Box::new(|_: &RecordedRequest| {
        (200, r#"{"user":"admin"}"#.to_string())
    }));

    let err = HttpAppliance::authenticate(
        ClientConfig::new(server.base_url.clone()),
        "admin",
        "secret",
    )
    .unwrap_err();

    assert!(matches!(err, ApplianceError::Schema { .. }));
}

#[test]
fn test_image_missing_field_is_schema_error() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            _ => (
                200,
                r#"[{"uuid":"u1","drive_letter":"C:","snapshot_time":1}]"#.to_string(),
            ),
        }
    }));
    let appliance = login(&server);

    match appliance.list_images().unwrap_err() {
        ApplianceError::Schema { endpoint, source } => {
            assert_eq!(endpoint, "/v1/image");
            assert!(source.to_string().contains("filename"));
        }
        other => panic!("Expected Schema, got {:?}", other),
    }
}

#[test]
fn test_snapshot_time_accepts_numeric_string() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            _ => (
                200,
                r#"[{"uuid":"u1","drive_letter":"C:","filename":"c.spf","snapshot_time":"1700000000"}]"#
                    .to_string(),
            ),
        }
    }));
    let appliance = login(&server);

    let images = appliance.list_images().unwrap();
    assert_eq!(images[0].snapshot_time, SnapshotTime::from_secs(1_700_000_000));
}

#[test]
fn test_non_success_status_after_login() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            _ => (503, "maintenance".to_string()),
        }
    }));
    let appliance = login(&server);

    match appliance.job("42").unwrap_err() {
        ApplianceError::Status {
            endpoint,
            status,
            body,
        } => {
            assert_eq!(endpoint, "/v1/chore/42");
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("Expected Status, got {:?}", other),
    }
}

#[test]
fn test_job_status_is_decoded() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            "/spx/v1/chore/5" => (200, r#"{"status":45,"extra":"ignored"}"#.to_string()),
            _ => (200, r#"{"status":-3}"#.to_string()),
        }
    }));
    let appliance = login(&server);

    assert_eq!(appliance.job("5").unwrap().state, JobState::Pending(45));
    assert_eq!(appliance.job("6").unwrap().state, JobState::Failed(-3));
}

#[test]
fn test_mount_and_unmount_request_bodies() {
    let server = MockServer::start(healthy_appliance(&["C:"]));
    let appliance = login(&server);

    let response = appliance
        .mount_image(&MountRequest {
            img: "C:-image.spf".to_string(),
            mountpoint: "R:".to_string(),
            read_only: true,
            use_existing_buffer: true,
            password: Some("key".to_string()),
        })
        .unwrap();
    assert_eq!(response, "\"7\"");

    let mounted = appliance.mounted_images().unwrap();
    assert_eq!(mounted[0].vol_num, "0");
    assert_eq!(mounted[0].snap_drive, "C:");

    let response = appliance
        .unmount_image(
            "0",
            &UnmountRequest {
                generate_incremental: true,
            },
        )
        .unwrap();
    assert_eq!(response, "unmounted");

    let requests = server.requests();
    let mount = find(&requests, "POST", "/spx/v1/mounted_image");
    let body: serde_json::Value = serde_json::from_str(&mount.body).unwrap();
    assert_eq!(body["img"], "C:-image.spf");
    assert_eq!(body["mountpoint"], "R:");
    assert_eq!(body["read_only"], true);
    assert_eq!(body["use_existing_buffer"], true);
    assert_eq!(body["password"], "key");
    assert_eq!(mount.authorization.as_deref(), Some("Token t0k3n"));

    let unmount = find(&requests, "DELETE", "/spx/v1/mounted_image/0");
    let body: serde_json::Value = serde_json::from_str(&unmount.body).unwrap();
    assert_eq!(body["generate_incremental"], true);
}

#[test]
fn test_full_run_over_http() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Test 1.txt"), "Data").unwrap();
    let server = MockServer::start(healthy_appliance(&["C:", "D:"]));

    let options = RestoreOptions::default()
        .with_mountpoint(dir.path().to_string_lossy().into_owned())
        .with_poll_interval(Duration::ZERO);
    let report = RestoreTester::new(login(&server), options).run().unwrap();

    assert_eq!(report.volumes.len(), 2);
    assert_eq!(report.passed(), 2);

    let requests = server.requests();
    let mounts = requests
        .iter()
        .filter(|r| r.method == "POST" && r.url == "/spx/v1/mounted_image")
        .count();
    assert_eq!(mounts, 2);
    find(&requests, "DELETE", "/spx/v1/mounted_image/0");
    find(&requests, "DELETE", "/spx/v1/mounted_image/1");
    assert!(requests
        .iter()
        .filter(|r| r.url != "/spx/auth/login")
        .all(|r| r.authorization.as_deref() == Some("Token t0k3n")));
}

#[test]
fn test_fractional_snapshot_times_pick_newest_image() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            _ => (
                200,
                r#"[
                    {"uuid":"a-old","drive_letter":"C:","filename":"old.spi","snapshot_time":1700000000.1},
                    {"uuid":"b-new","drive_letter":"C:","filename":"new.spi","snapshot_time":1700000000.9}
                ]"#
                .to_string(),
            ),
        }
    }));
    let tester = RestoreTester::new(login(&server), RestoreOptions::default());

    let latest = tester.latest_images().unwrap();

    assert_eq!(latest["C:"].path, "new.spi");
    assert_eq!(latest["C:"].uuid, "b-new");
}

#[test]
fn test_float_job_status_is_accepted() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match req.url.as_str() {
            "/spx/auth/login" => (200, r#"{"token":"abc"}"#.to_string()),
            "/spx/v1/chore/1" => (200, r#"{"status":100.0}"#.to_string()),
            _ => (200, r#"{"status":"12.5"}"#.to_string()),
        }
    }));
    let appliance = login(&server);

    assert_eq!(appliance.job("1").unwrap().state, JobState::Complete);
    assert_eq!(appliance.job("2").unwrap().state, JobState::Pending(12));
}

#[test]
fn test_ids_are_percent_encoded_in_paths() {
    let server = MockServer::start(Box::new(|req: &RecordedRequest| {
        match (req.method.as_str(), req.url.as_str()) {
            ("POST", "/spx/auth/login") => (200, r#"{"token":"abc"}"#.to_string()),
            ("GET", _) => (200, r#"{"status":100}"#.to_string()),
            _ => (200, "unmounted".to_string()),
        }
    }));
    let appliance = login(&server);

    appliance.job("7/../image?x#y").unwrap();
    appliance
        .unmount_image(
            "3/4",
            &UnmountRequest {
                generate_incremental: false,
            },
        )
        .unwrap();

    let requests = server.requests();
    find(&requests, "GET", "/spx/v1/chore/7%2F..%2Fimage%3Fx%23y");
    find(&requests, "DELETE", "/spx/v1/mounted_image/3%2F4");
}

#[test]
fn test_dot_segment_id_is_rejected_without_request() {
    let server = MockServer::start(healthy_appliance(&["C:"]));
    let appliance = login(&server);

    let err = appliance.job("..").unwrap_err();

    assert!(matches!(err, ApplianceError::InvalidId { .. }));
    assert_eq!(server.requests().len(), 1);
}
