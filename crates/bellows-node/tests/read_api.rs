//! Read API tests over a populated repository.

mod common;

use axum::http::{header, StatusCode};
use common::*;

use bellows_types::Visibility;

async fn populated_forge(visibility: Visibility) -> (TestForge, String) {
    let forge = build_forge(false);
    let (alice, token) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", visibility).await;
    let bare = forge.repo_base().join("alice/widget.git");
    populate_bare(forge.repo_base().parent().unwrap(), &bare);
    (forge, token)
}

#[tokio::test]
async fn tree_lists_the_root() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let response = forge
        .request(get("/api/repos/alice/widget/tree/trunk"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"README.md"));
    assert!(names.contains(&"src"));
    assert_eq!(body[0]["type"], "blob");
}

#[tokio::test]
async fn tree_resolves_slashed_refs_greedily() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    // `feature/x/NOTES.md` must split into ref `feature/x`, path `NOTES.md`.
    let response = forge
        .request(get("/api/repos/alice/widget/tree/feature/x/NOTES.md"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "NOTES.md");
}

#[tokio::test]
async fn blob_returns_content_as_a_json_string() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let response = forge
        .request(get("/api/repos/alice/widget/blob/trunk/README.md"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!("line one\nline two\n"));
}

#[tokio::test]
async fn commits_limit_to_twenty_and_parse_fields() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let response = forge
        .request(get("/api/repos/alice/widget/commits/trunk/README.md"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let commits = body.as_array().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0]["author"], "Test");
    assert_eq!(commits[0]["message"], "initial import");
    assert_eq!(commits[0]["hash"].as_str().unwrap().len(), 40);
}

#[tokio::test]
async fn branches_list_both_fixture_branches() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let response = forge.request(get("/api/repos/alice/widget/branches")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"trunk"));
    assert!(names.contains(&"feature/x"));
}

#[tokio::test]
async fn diff_returns_the_patch_as_text() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let branches = body_json(
        forge
            .request(get("/api/repos/alice/widget/branches"))
            .await,
    )
    .await;
    let sha = branches
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["name"] == "trunk")
        .unwrap()["commit"]
        .as_str()
        .unwrap()
        .to_string();

    let response = forge
        .request(get(&format!("/api/repos/alice/widget/diff/{sha}")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("initial import"));
    assert!(body.contains("README.md"));
}

#[tokio::test]
async fn blame_attributes_lines() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    let response = forge
        .request(get("/api/repos/alice/widget/blame/trunk/README.md"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let lines = body.as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["line_no"], 1);
    assert_eq!(lines[0]["author"], "Test");
    assert_eq!(lines[0]["content"], "line one");
}

#[tokio::test]
async fn unknown_refs_paths_and_shas_are_not_found() {
    let (forge, _) = populated_forge(Visibility::Public).await;

    for uri in [
        "/api/repos/alice/widget/tree/no-such-branch",
        "/api/repos/alice/widget/blob/trunk/missing.txt",
        "/api/repos/alice/widget/diff/ffffffffffffffffffffffffffffffffffffffff",
        "/api/repos/alice/other/tree/trunk",
    ] {
        let response = forge.request(get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn private_repo_views_are_hidden_from_anonymous() {
    let (forge, token) = populated_forge(Visibility::Private).await;

    let anonymous = forge
        .request(get("/api/repos/alice/widget/branches"))
        .await;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);

    let owner = forge
        .request(get_auth("/api/repos/alice/widget/branches", &token))
        .await;
    assert_eq!(owner.status(), StatusCode::OK);
}
