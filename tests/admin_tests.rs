// tests/admin_tests.rs

mod common;

use common::{ADMIN_USERNAME, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn admin_routes_require_admin_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/admin/cards"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = app.admin_get("not-a-jwt", "/api/admin/students").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "nobody", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn student_crud() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    let student_id = format!("STU{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

    app.create_student(&token, &student_id, "JSS 2").await;

    // Duplicate admission numbers conflict.
    let response = app
        .admin_post(
            &token,
            "/api/admin/students",
            json!({ "studentId": student_id, "fullName": "Someone Else", "class": "JSS 2" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .admin_put(
            &token,
            &format!("/api/admin/students/{}", student_id),
            json!({ "fullName": "Ada Obi", "photoUrl": "https://cdn.example.com/ada.jpg" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["fullName"], "Ada Obi");
    assert_eq!(updated["class"], "JSS 2");

    let response = app
        .admin_put(
            &token,
            &format!("/api/admin/students/{}", student_id),
            json!({ "photoUrl": "javascript:alert(1)" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let listed: Vec<Value> = app
        .admin_get(&token, "/api/admin/students?class=JSS%202")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let response = app
        .admin_delete(&token, &format!("/api/admin/students/{}", student_id))
        .await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app
        .admin_get(&token, &format!("/api/admin/students/{}", student_id))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn results_are_ranked_within_their_cohort() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    for id in ["A1", "A2", "A3", "B1"] {
        app.create_student(&token, id, "JSS 1").await;
    }

    let first = app.create_result(&token, "A1", "JSS 1", 60.0).await;
    assert_eq!((first["position"].clone(), first["outOf"].clone()), (json!(1), json!(1)));

    let second = app.create_result(&token, "A2", "JSS 1", 90.0).await;
    assert_eq!(second["position"], 1);
    assert_eq!(second["outOf"], 2);

    let third = app.create_result(&token, "A3", "JSS 1", 75.0).await;
    let other = app.create_result(&token, "B1", "JSS 2", 40.0).await;
    assert_eq!(other["position"], 1);
    assert_eq!(other["outOf"], 1);

    let ranked: Vec<Value> = app
        .admin_get(&token, "/api/admin/results?class=JSS%201&session=2024/2025")
        .await
        .json()
        .await
        .unwrap();
    let position_of = |id: &Value| {
        ranked
            .iter()
            .find(|r| r["id"] == *id)
            .map(|r| (r["position"].as_i64().unwrap(), r["outOf"].as_i64().unwrap()))
            .unwrap()
    };
    assert_eq!(position_of(&second["id"]), (1, 3));
    assert_eq!(position_of(&third["id"]), (2, 3));
    assert_eq!(position_of(&first["id"]), (3, 3));

    // Moving a result re-ranks both cohorts.
    let response = app
        .admin_put(
            &token,
            &format!("/api/admin/results/{}", second["id"]),
            json!({ "class": "JSS 2" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let moved: Value = response.json().await.unwrap();
    assert_eq!((moved["position"].as_i64(), moved["outOf"].as_i64()), (Some(1), Some(2)));

    let third_now: Value = app
        .admin_get(&token, &format!("/api/admin/results/{}", third["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!((third_now["position"].as_i64(), third_now["outOf"].as_i64()), (Some(1), Some(2)));

    // Deleting re-ranks what remains.
    let response = app
        .admin_delete(&token, &format!("/api/admin/results/{}", third["id"]))
        .await;
    assert_eq!(response.status().as_u16(), 204);
    let first_now: Value = app
        .admin_get(&token, &format!("/api/admin/results/{}", first["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!((first_now["position"].as_i64(), first_now["outOf"].as_i64()), (Some(1), Some(1)));
}

#[tokio::test]
async fn score_only_update_keeps_stored_positions() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    for id in ["C1", "C2"] {
        app.create_student(&token, id, "JSS 3").await;
    }
    let low = app.create_result(&token, "C1", "JSS 3", 60.0).await;
    let high = app.create_result(&token, "C2", "JSS 3", 90.0).await;

    let placement = |result: &Value| (result["position"].as_i64(), result["outOf"].as_i64());

    let response = app
        .admin_put(
            &token,
            &format!("/api/admin/results/{}", low["id"]),
            json!({ "average": 95.0, "teacherRemark": "Much improved" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["average"], 95.0);
    assert_eq!(updated["teacherRemark"], "Much improved");
    assert_eq!(placement(&updated), (Some(2), Some(2)));

    let high_now: Value = app
        .admin_get(&token, &format!("/api/admin/results/{}", high["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(placement(&high_now), (Some(1), Some(2)));

    // Positions catch up on the next recalculation.
    let response = app
        .admin_post(
            &token,
            "/api/admin/results/recalculate",
            json!({ "class": "JSS 3", "session": "2024/2025", "term": "First Term" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let low_now: Value = app
        .admin_get(&token, &format!("/api/admin/results/{}", low["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(placement(&low_now), (Some(1), Some(2)));
}

#[tokio::test]
async fn result_validation_and_sanitizing() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    app.create_student(&token, "STU001", "JSS 1").await;

    let bad_session = app
        .admin_post(
            &token,
            "/api/admin/results",
            json!({
                "studentId": "STU001",
                "session": "2024",
                "term": "First Term",
                "class": "JSS 1",
                "subjects": [{ "subject": "English", "score": 50 }],
            }),
        )
        .await;
    assert_eq!(bad_session.status().as_u16(), 400);

    let bad_score = app
        .admin_post(
            &token,
            "/api/admin/results",
            json!({
                "studentId": "STU001",
                "session": "2024/2025",
                "term": "First Term",
                "class": "JSS 1",
                "subjects": [{ "subject": "English", "score": 140 }],
            }),
        )
        .await;
    assert_eq!(bad_score.status().as_u16(), 400);

    let unknown_student = app
        .admin_post(
            &token,
            "/api/admin/results",
            json!({
                "studentId": "NOBODY",
                "session": "2024/2025",
                "term": "First Term",
                "class": "JSS 1",
                "subjects": [{ "subject": "English", "score": 50 }],
            }),
        )
        .await;
    assert_eq!(unknown_student.status().as_u16(), 404);

    let response = app
        .admin_post(
            &token,
            "/api/admin/results",
            json!({
                "studentId": "STU001",
                "session": "2024/2025",
                "term": "First Term",
                "class": "JSS 1",
                "subjects": [{ "subject": "English", "score": 50 }],
                "teacherRemark": "<b>Steady</b><script>alert(1)</script>",
                "position": 99,
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["teacherRemark"], "<b>Steady</b>");
    assert_eq!(created["position"], 1);

    let response = app
        .admin_put(
            &token,
            &format!("/api/admin/results/{}", created["id"]),
            json!({ "subjects": [] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn manual_recalculation_reports_count() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    for id in ["A1", "A2"] {
        app.create_student(&token, id, "SS 3").await;
        app.create_result(&token, id, "SS 3", 55.0).await;
    }

    let response = app
        .admin_post(
            &token,
            "/api/admin/results/recalculate",
            json!({ "class": "SS 3", "session": "2024/2025", "term": "First Term" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"], 2);
    assert!(body["message"].as_str().unwrap().contains('2'));
}

#[tokio::test]
async fn card_listing_and_summary() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let response = app
        .admin_post(&token, "/api/admin/cards", json!({ "count": 3, "expiryDays": 30 }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let cards: Vec<Value> = response.json().await.unwrap();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c["usageLimit"] == 30));

    let response = app.admin_post(&token, "/api/admin/cards", json!({ "count": 0 })).await;
    assert_eq!(response.status().as_u16(), 400);

    app.admin_post(
        &token,
        &format!("/api/admin/cards/{}/deactivate", cards[0]["id"]),
        json!({}),
    )
    .await;

    let summary: Value = app
        .admin_get(&token, "/api/admin/cards/summary")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["unused"], 2);
    assert_eq!(summary["deactivated"], 1);

    let unused: Vec<Value> = app
        .admin_get(&token, "/api/admin/cards?status=unused")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(unused.len(), 2);

    let response = app.admin_get(&token, "/api/admin/cards?status=revoked").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .admin_delete(&token, &format!("/api/admin/cards/{}", cards[1]["id"]))
        .await;
    assert_eq!(response.status().as_u16(), 204);
    let response = app
        .admin_get(&token, &format!("/api/admin/cards/{}", cards[1]["id"]))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}
