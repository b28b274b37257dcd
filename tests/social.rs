mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::app;

#[tokio::test]
async fn following_twice_conflicts_and_leaves_one_edge() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let bob = app.create_user("Bob").await;

    let first = app.put(&format!("/users/{}/follow", bob.id), Some(&alice.token)).await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.error_message());
    assert_eq!(first.json()["following"], json!([bob.id.to_string()]));

    let second = app.put(&format!("/users/{}/follow", bob.id), Some(&alice.token)).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.error_message(), "you are already following this user");

    let profile = app.get(&format!("/users/{}/profile", bob.id), Some(&alice.token)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["followers"], json!([alice.id.to_string()]));
}

#[tokio::test]
async fn follow_then_unfollow_restores_both_sides() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let bob = app.create_user("Bob").await;

    let followed = app.put(&format!("/users/{}/follow", bob.id), Some(&alice.token)).await;
    assert_eq!(followed.status, StatusCode::OK);

    let unfollowed = app.put(&format!("/users/{}/unfollow", bob.id), Some(&alice.token)).await;
    assert_eq!(unfollowed.status, StatusCode::OK);
    assert_eq!(unfollowed.json()["following"], json!([]));

    let profile = app.get(&format!("/users/{}/profile", bob.id), Some(&alice.token)).await;
    assert_eq!(profile.json()["followers"], json!([]));
    assert_eq!(profile.json()["following"], json!([]));
}

#[tokio::test]
async fn unfollow_without_edge_conflicts() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let bob = app.create_user("Bob").await;

    let res = app.put(&format!("/users/{}/unfollow", bob.id), Some(&alice.token)).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error_message(), "you are not following this user");
}

#[tokio::test]
async fn self_edges_are_rejected() {
    let app = app().await;
    let alice = app.create_user("Alice").await;

    let follow = app.put(&format!("/users/{}/follow", alice.id), Some(&alice.token)).await;
    assert_eq!(follow.status, StatusCode::BAD_REQUEST);

    let unfollow = app.put(&format!("/users/{}/unfollow", alice.id), Some(&alice.token)).await;
    assert_eq!(unfollow.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_users_are_not_found() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let ghost = Uuid::new_v4();

    let follow = app.put(&format!("/users/{}/follow", ghost), Some(&alice.token)).await;
    assert_eq!(follow.status, StatusCode::NOT_FOUND);

    let unfollow = app.put(&format!("/users/{}/unfollow", ghost), Some(&alice.token)).await;
    assert_eq!(unfollow.status, StatusCode::NOT_FOUND);

    let profile = app.get(&format!("/users/{}/profile", ghost), Some(&alice.token)).await;
    assert_eq!(profile.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_hides_email_and_counts_recipes() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let bob = app.create_user("Bob").await;
    app.create_recipe(&bob, "Shakshuka").await;

    let profile = app.get(&format!("/users/{}/profile", bob.id), Some(&alice.token)).await;
    assert_eq!(profile.status, StatusCode::OK);
    let body = profile.json();
    assert!(body.get("email").is_none());
    assert_eq!(body["recipes_count"], 1);
    assert_eq!(body["online"], false);
}

#[tokio::test]
async fn profile_reflects_presence() {
    let app = app().await;
    let alice = app.create_user("Alice").await;
    let bob = app.create_user("Bob").await;

    let (connection_id, _events) = app.state.presence.connect(bob.id).await;
    let online = app.get(&format!("/users/{}/profile", bob.id), Some(&alice.token)).await;
    assert_eq!(online.json()["online"], true);

    app.state.presence.disconnect(bob.id, connection_id).await;
    let offline = app.get(&format!("/users/{}/profile", bob.id), Some(&alice.token)).await;
    assert_eq!(offline.json()["online"], false);
}

#[tokio::test]
async fn update_profile_changes_only_given_fields() {
    let app = app().await;
    let alice = app.create_user("Alice").await;

    let res = app
        .put_json("/users/update", json!({ "bio": "Bakes on Sundays" }), Some(&alice.token))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["bio"], "Bakes on Sundays");
    assert_eq!(res.json()["name"], "Alice");

    let blank = app
        .put_json("/users/update", json!({ "name": "" }), Some(&alice.token))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
}
