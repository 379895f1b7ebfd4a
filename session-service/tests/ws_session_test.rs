mod common;

use common::*;
use serde_json::json;
use testcontainers::clients::Cli;
use uuid::Uuid;

#[tokio::test]
async fn handshake_without_valid_token_is_rejected() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;
    let ws_base = base.replacen("http", "ws", 1);

    // No token at all.
    assert!(
        tokio_tungstenite::connect_async(format!("{ws_base}/ws"))
            .await
            .is_err()
    );

    // Garbage token.
    assert!(
        tokio_tungstenite::connect_async(format!("{ws_base}/ws?token=not.a.jwt"))
            .await
            .is_err()
    );

    // Valid token whose subject is unknown to the identity store.
    let ghost = mint_token(Uuid::new_v4());
    assert!(
        tokio_tungstenite::connect_async(format!("{ws_base}/ws?token={ghost}"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn chat_roundtrip_with_offline_notification_fallback() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;

    let alice = seed_user(&pool, "alice", "student").await;
    let bob = seed_user(&pool, "bob", "student").await;
    let room = Uuid::new_v4();

    let mut ws_a = connect_ws(&base, &mint_token(alice)).await;
    let mut ws_b = connect_ws(&base, &mint_token(bob)).await;

    // Both join; joining an unknown room creates it.
    send_json(&mut ws_a, json!({"type": "join-room", "roomId": room})).await;
    next_event_of(&mut ws_a, "room.history").await;
    send_json(&mut ws_b, json!({"type": "join-room", "roomId": room})).await;
    next_event_of(&mut ws_b, "room.history").await;
    next_event_of(&mut ws_a, "room.participant_joined").await;

    // A sends; both receive the identical persisted record.
    send_json(
        &mut ws_a,
        json!({"type": "send-message", "roomId": room, "message": "hello"}),
    )
    .await;
    let got_a = next_event_of(&mut ws_a, "message.new").await;
    let got_b = next_event_of(&mut ws_b, "message.new").await;
    assert_eq!(got_a["message"], got_b["message"]);
    assert_eq!(got_a["message"]["body"], "hello");
    assert_eq!(got_a["message"]["sender_name"], "alice");

    // Broadcast matches the persisted row, server-assigned id included.
    let message_id = Uuid::parse_str(got_a["message"]["id"].as_str().unwrap()).unwrap();
    let stored_body: String =
        sqlx::query_scalar("SELECT body FROM messages WHERE id = $1 AND room_id = $2")
            .bind(message_id)
            .bind(room)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored_body, "hello");

    // B leaves the live group but stays connected: next message arrives as
    // a short-form alert on B's private channel, not as a room event.
    send_json(&mut ws_b, json!({"type": "leave-room", "roomId": room})).await;
    next_event_of(&mut ws_a, "room.participant_left").await;

    send_json(
        &mut ws_a,
        json!({"type": "send-message", "roomId": room, "message": "still there?"}),
    )
    .await;
    next_event_of(&mut ws_a, "message.new").await;
    let alert = next_event_of(&mut ws_b, "message.alert").await;
    assert_eq!(alert["preview"], "still there?");

    // B disconnects entirely: the fallback is a persisted notification.
    drop(ws_b);
    // Give the server a moment to run disconnect cleanup.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    send_json(
        &mut ws_a,
        json!({"type": "send-message", "roomId": room, "message": "bye"}),
    )
    .await;
    let got_bye = next_event_of(&mut ws_a, "message.new").await;
    assert_eq!(got_bye["message"]["body"], "bye");

    let mut notified = 0i64;
    for _ in 0..20 {
        notified = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE recipient_id = $1 AND notification_type = 'message' AND body = 'bye'",
        )
        .bind(bob)
        .fetch_one(&pool)
        .await
        .unwrap();
        if notified > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
    assert_eq!(notified, 1, "offline participant should get a notification row");
}

#[tokio::test]
async fn markup_is_sanitized_before_persist_and_broadcast() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;

    let user = seed_user(&pool, "carol", "student").await;
    let room = Uuid::new_v4();
    let mut ws = connect_ws(&base, &mint_token(user)).await;

    send_json(&mut ws, json!({"type": "join-room", "roomId": room})).await;
    next_event_of(&mut ws, "room.history").await;

    send_json(
        &mut ws,
        json!({
            "type": "send-message",
            "roomId": room,
            "message": "<script>alert(1)</script><b>bold</b> stays"
        }),
    )
    .await;
    let got = next_event_of(&mut ws, "message.new").await;
    assert_eq!(got["message"]["body"], "alert(1)<b>bold</b> stays");
}

#[tokio::test]
async fn exam_lifecycle_scores_and_completes_exactly_once() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;

    let user = seed_user(&pool, "dave", "student").await;
    let exam = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO exams (id, title, specialty, duration_seconds, answer_key) \
         VALUES ($1, 'Anatomy basics', 'anatomy', 600, '[0,1,2]'::jsonb)",
    )
    .bind(exam)
    .execute(&pool)
    .await
    .unwrap();

    let mut ws = connect_ws(&base, &mint_token(user)).await;

    send_json(&mut ws, json!({"type": "join-exam", "examId": exam})).await;
    let joined = next_event_of(&mut ws, "exam.joined").await;
    assert_eq!(joined["resumed"], false);
    assert_eq!(joined["current_question"], 0);
    assert_eq!(joined["time_remaining"], 600);

    send_json(
        &mut ws,
        json!({
            "type": "exam-progress",
            "examId": exam,
            "currentQuestion": 2,
            "timeRemaining": 400,
            "answers": [0, 1, 1]
        }),
    )
    .await;
    next_event_of(&mut ws, "exam.progress_saved").await;

    // Re-join is idempotent: same session, no timer reset.
    send_json(&mut ws, json!({"type": "join-exam", "examId": exam})).await;
    let rejoined = next_event_of(&mut ws, "exam.joined").await;
    assert_eq!(rejoined["resumed"], true);
    assert_eq!(rejoined["current_question"], 2);
    assert_eq!(rejoined["time_remaining"], 400);

    send_json(&mut ws, json!({"type": "exam-complete", "examId": exam})).await;
    let completed = next_event_of(&mut ws, "exam.completed").await;
    assert_eq!(completed["result"]["correct_count"], 2);
    assert_eq!(completed["result"]["total_questions"], 3);
    let score = completed["result"]["score_percent"].as_f64().unwrap();
    assert!((score - 200.0 / 3.0).abs() < 0.01);

    // Second completion is rejected and no second result row appears.
    send_json(&mut ws, json!({"type": "exam-complete", "examId": exam})).await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "validation");

    let results: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_results WHERE exam_id = $1 AND user_id = $2",
    )
    .bind(exam)
    .bind(user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(results, 1);

    let status: String = sqlx::query_scalar(
        "SELECT status FROM exam_sessions WHERE exam_id = $1 AND user_id = $2",
    )
    .bind(exam)
    .bind(user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn send_message_rate_limit_rejects_over_cap_and_keeps_connection() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_seconds = 60;
    let state = build_state(pool.clone(), config);
    let base = start_app(state).await;

    let user = seed_user(&pool, "eve", "student").await;
    let room = Uuid::new_v4();
    let mut ws = connect_ws(&base, &mint_token(user)).await;

    send_json(&mut ws, json!({"type": "join-room", "roomId": room})).await;
    next_event_of(&mut ws, "room.history").await;

    for i in 0..3 {
        send_json(
            &mut ws,
            json!({"type": "send-message", "roomId": room, "message": format!("m{i}")}),
        )
        .await;
        next_event_of(&mut ws, "message.new").await;
    }

    send_json(
        &mut ws,
        json!({"type": "send-message", "roomId": room, "message": "one too many"}),
    )
    .await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "rate_limit");

    // Rejected, not disconnected.
    send_json(&mut ws, json!({"type": "heartbeat"})).await;
    next_event_of(&mut ws, "heartbeat.ack").await;
}

#[tokio::test]
async fn role_gated_commands_reject_students() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;

    let student = seed_user(&pool, "frank", "student").await;
    let instructor = seed_user(&pool, "grace", "instructor").await;

    let mut ws = connect_ws(&base, &mint_token(student)).await;

    // Students cannot trigger a recompute.
    send_json(&mut ws, json!({"type": "leaderboard-refresh"})).await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "authorization");

    // Nor notify someone else.
    send_json(
        &mut ws,
        json!({
            "type": "notification-send",
            "userId": instructor,
            "notificationType": "nudge",
            "title": "hi",
            "message": "do your homework"
        }),
    )
    .await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "authorization");

    // An instructor targeting a student is allowed and delivered live.
    let mut ws_i = connect_ws(&base, &mint_token(instructor)).await;
    send_json(
        &mut ws_i,
        json!({
            "type": "notification-send",
            "userId": student,
            "notificationType": "reminder",
            "title": "Exam tomorrow",
            "message": "Room 4, 9am",
            "priority": "high"
        }),
    )
    .await;
    let note = next_event_of(&mut ws, "notification.new").await;
    assert_eq!(note["notification"]["title"], "Exam tomorrow");
    assert_eq!(note["notification"]["priority"], "high");

    // Mark-read returns the unread count to the requester only.
    let note_id = note["notification"]["id"].as_str().unwrap();
    send_json(
        &mut ws,
        json!({"type": "notification-read", "notificationId": note_id}),
    )
    .await;
    let count = next_event_of(&mut ws, "notification.unread_count").await;
    assert_eq!(count["unread_count"], 0);
}

#[tokio::test]
async fn malformed_commands_get_validation_errors() {
    let docker = Cli::default();
    let (_db, pool) = start_db(&docker).await;
    let state = build_state(pool.clone(), test_config());
    let base = start_app(state).await;

    let user = seed_user(&pool, "henry", "student").await;
    let mut ws = connect_ws(&base, &mint_token(user)).await;

    // Unknown command name.
    send_json(&mut ws, json!({"type": "self-destruct"})).await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "validation");

    // Known command, missing required field.
    send_json(&mut ws, json!({"type": "join-room"})).await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "validation");

    // Command against a missing resource.
    send_json(
        &mut ws,
        json!({"type": "exam-progress", "examId": Uuid::new_v4(), "currentQuestion": 0, "timeRemaining": 1, "answers": []}),
    )
    .await;
    let err = next_event_of(&mut ws, "error").await;
    assert_eq!(err["code"], "not_found");
}
