//! LFS batch and object endpoint tests. The blob store is the in-memory
//! fake; no git child is involved.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;

use bellows_blob::{BlobKey, BlobStore};
use bellows_types::{AuditAction, RepoRole, Visibility};

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

fn oid(fill: char) -> String {
    std::iter::repeat(fill).take(64).collect()
}

fn batch_body(operation: &str, oids: &[String]) -> serde_json::Value {
    serde_json::json!({
        "operation": operation,
        "objects": oids.iter().map(|o| serde_json::json!({"oid": o, "size": 12})).collect::<Vec<_>>(),
    })
}

fn lfs_request(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, LFS_MEDIA_TYPE)
        .header(header::ACCEPT, LFS_MEDIA_TYPE);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn download_batch_reports_missing_and_present_objects() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let present = oid('a');
    let absent = oid('b');
    forge
        .blobs
        .put(
            &BlobKey::new("alice", "widget", &present),
            bellows_blob::stream_of(bytes::Bytes::from_static(b"hello world!")),
        )
        .await
        .unwrap();

    let response = forge
        .request(lfs_request(
            "/alice/widget/objects/batch",
            None,
            batch_body("download", &[present.clone(), absent.clone()]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        LFS_MEDIA_TYPE
    );

    let body = body_json(response).await;
    assert_eq!(body["transfer"], "basic");
    let objects = body["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(
        objects[0]["actions"]["download"]["href"],
        format!("/alice/widget/objects/{present}")
    );
    assert_eq!(objects[1]["error"]["code"], 404);
}

#[tokio::test]
async fn upload_batch_requires_identity() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let response = forge
        .request(lfs_request(
            "/alice/widget/objects/batch",
            None,
            batch_body("upload", &[oid('a')]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pull_only_identity_cannot_negotiate_uploads() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    let (bob, bob_token) = seed_user(&forge, "bob");
    let repo = seed_repo(&forge, &alice, "secret", Visibility::Private).await;
    forge
        .records
        .members
        .set(repo.id, bob.id, RepoRole::Viewer)
        .unwrap();

    let response = forge
        .request(lfs_request(
            "/alice/secret/objects/batch",
            Some(&bob_token),
            batch_body("upload", &[oid('a')]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(forge.blobs.is_empty());
}

#[tokio::test]
async fn owner_negotiates_uploads() {
    let forge = build_forge(false);
    let (alice, token) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let object = oid('c');
    let response = forge
        .request(lfs_request(
            "/alice/widget/objects/batch",
            Some(&token),
            batch_body("upload", &[object.clone()]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["objects"][0]["actions"]["upload"]["href"],
        format!("/alice/widget/objects/{object}")
    );
}

#[tokio::test]
async fn object_round_trip_with_audit() {
    let forge = build_forge(false);
    let (alice, token) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let object = oid('d');
    let uri = format!("/alice/widget/objects/{object}");

    let put = Request::builder()
        .method("PUT")
        .uri(uri.as_str())
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("large file content"))
        .unwrap();
    let response = forge.request(put).await;
    assert_eq!(response.status(), StatusCode::OK);

    let get_response = forge.request(get(&uri)).await;
    assert_eq!(get_response.status(), StatusCode::OK);
    assert_eq!(
        get_response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    assert_eq!(body_bytes(get_response).await, b"large file content");

    let upload = wait_for_audit(&forge.audit, AuditAction::LfsUpload).await;
    assert_eq!(upload.actor_id, Some(alice.id));
    let download = wait_for_audit(&forge.audit, AuditAction::LfsDownload).await;
    assert_eq!(download.metadata["oid"], object);
}

#[tokio::test]
async fn anonymous_upload_writes_nothing() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let put = Request::builder()
        .method("PUT")
        .uri(format!("/alice/widget/objects/{}", oid('e')))
        .body(Body::from("sneaky"))
        .unwrap();
    let response = forge.request(put).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(forge.blobs.is_empty());
}

#[tokio::test]
async fn private_repo_batch_hides_from_anonymous() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "secret", Visibility::Private).await;

    let response = forge
        .request(lfs_request(
            "/alice/secret/objects/batch",
            None,
            batch_body("download", &[oid('a')]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_oids_are_rejected() {
    let forge = build_forge(false);
    let (alice, token) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    // Batch: per-object error, not a failed request.
    let response = forge
        .request(lfs_request(
            "/alice/widget/objects/batch",
            Some(&token),
            batch_body("upload", &["UPPERCASE".to_string()]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["objects"][0]["error"]["code"], 422);

    // Object PUT: outright rejection.
    let put = Request::builder()
        .method("PUT")
        .uri("/alice/widget/objects/not-an-oid-at-all-but-sixtyfour-chars-loooooooooooooooooong")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("x"))
        .unwrap();
    let response = forge.request(put).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(forge.blobs.is_empty());
}

#[tokio::test]
async fn unknown_batch_operation_is_a_bad_request() {
    let forge = build_forge(false);
    let (alice, _) = seed_user(&forge, "alice");
    seed_repo(&forge, &alice, "widget", Visibility::Public).await;

    let response = forge
        .request(lfs_request(
            "/alice/widget/objects/batch",
            None,
            batch_body("mirror", &[oid('a')]),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
