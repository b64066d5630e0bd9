//! Integration tests for characters, stories and turn taking.

mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_turn_taking_over_http() {
    let app = common::build_test_app();
    let cara = app.player("cara").await;
    let dov = app.player("dov").await;
    let story_id = app.story(&cara, "Dusk Harbour").await;

    let (status, part) = app.add_part(&cara, &story_id, "It began at dusk.").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(part["part_order"], 1);
    assert_eq!(part["author_username"], "cara");

    let (status, body) = app.add_part(&cara, &story_id, "And again.").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NOT_YOUR_TURN");

    let (_, turn) = app
        .get(&format!("/stories/{}/turn", story_id), Some(&cara.token))
        .await;
    assert_eq!(turn["can_contribute"], false);
    let (_, turn) = app
        .get(&format!("/stories/{}/turn", story_id), Some(&dov.token))
        .await;
    assert_eq!(turn["can_contribute"], true);

    let (status, part) = app.add_part(&dov, &story_id, "Dov answered.").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(part["part_order"], 2);

    let (status, detail) = app.get(&format!("/stories/{}", story_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["story"]["part_count"], 2);
    let orders: Vec<i64> = detail["parts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["part_order"].as_i64().unwrap())
        .collect();
    assert_eq!(orders, vec![1, 2]);
}

#[tokio::test]
async fn test_contribution_notifies_story_creator() {
    let app = common::build_test_app();
    let cara = app.player("cara").await;
    let dov = app.player("dov").await;
    let story_id = app.story(&cara, "Dusk Harbour").await;

    // The creator's own part does not notify anyone.
    app.add_part(&cara, &story_id, "First.").await;
    let (_, count) = app.get("/notifications/unread-count", Some(&cara.token)).await;
    assert_eq!(count["unread"], 0);

    app.add_part(&dov, &story_id, "Second.").await;
    let (_, unread) = app.get("/notifications/unread", Some(&cara.token)).await;
    let unread = unread.as_array().unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0]["from_username"], "dov");
    assert_eq!(unread[0]["link"], format!("/stories/{}", story_id));
}

#[tokio::test]
async fn test_story_requires_character() {
    let app = common::build_test_app();
    let loner = app.sign_up("loner").await;

    let (status, body) = app
        .post("/stories", Some(&loner.token), json!({ "title": "Nobody's Tale" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NO_CHARACTER");
}

#[tokio::test]
async fn test_one_character_per_user() {
    let app = common::build_test_app();
    let mira = app.player("mira").await;

    let (status, body) = app
        .post("/characters", Some(&mira.token), json!({ "name": "Another" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn test_character_listing_splits_out_caller() {
    let app = common::build_test_app();
    let mira = app.player("mira").await;
    app.player("bo").await;
    app.player("cy").await;

    let (status, body) = app.get("/characters", Some(&mira.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_user_character"]["owner_username"], "mira");
    assert_eq!(body["other_characters"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_character_detail_lists_stories() {
    let app = common::build_test_app();
    let mira = app.player("mira").await;
    let bo = app.player("bo").await;
    let mine = app.story(&mira, "Mira's Tale").await;
    let theirs = app.story(&bo, "Bo's Tale").await;
    app.add_part(&mira, &theirs, "Mira wrote here.").await;

    let (_, list) = app.get("/characters", Some(&mira.token)).await;
    let character_id = list["current_user_character"]["id"].as_str().unwrap().to_string();

    let (status, detail) = app.get(&format!("/characters/{}", character_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["created_stories"][0]["id"], mine);
    assert_eq!(detail["contributed_stories"][0]["id"], theirs);
}

#[tokio::test]
async fn test_delete_story_only_by_creator() {
    let app = common::build_test_app();
    let cara = app.player("cara").await;
    let dov = app.player("dov").await;
    let story_id = app.story(&cara, "Short Lived").await;

    let uri = format!("/stories/{}", story_id);
    let (status, _) = app.request("DELETE", &uri, Some(&dov.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request("DELETE", &uri, Some(&cara.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_missing_story() {
    let app = common::build_test_app();
    let cara = app.player("cara").await;
    let missing = uuid::Uuid::new_v4();

    let (status, _) = app.add_part(&cara, &missing.to_string(), "Into the void.").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_story_id_is_not_found() {
    let app = common::build_test_app();
    let cara = app.player("cara").await;

    let (status, body) = app.add_part(&cara, "42", "Nowhere.").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, body) = app.get("/stories/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}
