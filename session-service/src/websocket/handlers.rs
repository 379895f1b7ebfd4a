use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::auth::authenticate_handshake;
use crate::models::identity::Identity;
use crate::models::presence::PresenceStatus;
use crate::models::room::RoomKind;
use crate::services::exam_service::ExamService;
use crate::services::leaderboard_service::{LeaderboardService, PERIODS, SPECIALTY_ALL};
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::presence_service::PresenceService;
use crate::services::room_service::RoomService;
use crate::services::typing_service::TypingService;
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use crate::websocket::message_types::ClientCommand;
use crate::websocket::ConnectionId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // The one gate excluding unauthenticated traffic: reject before the
    // upgrade so a failed handshake leaves no state behind.
    let identity = match authenticate_handshake(&state.db, params.token.as_deref(), &headers).await
    {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, identity, socket))
}

/// Queue an event on this connection's private outbound channel.
fn send_to_self(tx: &UnboundedSender<String>, event: &ServerEvent) {
    match event.to_payload() {
        Ok(payload) => {
            let _ = tx.send(payload);
        }
        Err(e) => error!(error = %e, event = event.event_type(), "failed to serialize event"),
    }
}

async fn broadcast_presence(state: &AppState, user_id: Uuid, status: PresenceStatus) {
    let event = ServerEvent::PresenceChanged {
        user_id,
        status: status.as_str().to_string(),
    };
    match event.to_payload() {
        Ok(payload) => state.registry.broadcast_all(&payload).await,
        Err(e) => error!(error = %e, "failed to serialize presence event"),
    }
}

async fn handle_socket(state: AppState, identity: Identity, socket: WebSocket) {
    let connection_id = ConnectionId::new();
    let (tx, mut rx) = state.registry.register(identity.user_id, connection_id).await;
    metrics::ACTIVE_CONNECTIONS.inc();

    // Presence goes online before the first command is read, and the
    // status change is visible to everyone.
    if let Err(e) =
        PresenceService::set_online(&state.db, identity.user_id, connection_id.as_uuid()).await
    {
        error!(error = %e, user_id = %identity.user_id, "failed to set presence online");
    }
    broadcast_presence(&state, identity.user_id, PresenceStatus::Online).await;

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_command_text(&state, &identity, connection_id, &tx, &text).await;
                    }
                    // Pong replies are handled by the framework.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    cleanup_connection(&state, &identity, connection_id).await;
    metrics::ACTIVE_CONNECTIONS.dec();
}

/// Disconnect duties: evict the connection from the registry (announcing
/// the departure to each room it sat in), drop its rate-limit bucket and
/// typing indicators, and flip presence offline if this connection still
/// owns the entry. Already-started command handlers run to completion;
/// nothing here rolls their writes back.
async fn cleanup_connection(state: &AppState, identity: &Identity, connection_id: ConnectionId) {
    let rooms_left = state.registry.unregister(identity.user_id, connection_id).await;
    for room_id in rooms_left {
        let event = ServerEvent::ParticipantLeft {
            room_id,
            user_id: identity.user_id,
        };
        if let Ok(payload) = event.to_payload() {
            state.registry.broadcast_room(room_id, &payload, None).await;
        }
    }

    state.limiter.discard(connection_id).await;

    if let Err(e) = TypingService::clear_for_user(&state.db, identity.user_id).await {
        warn!(error = %e, user_id = %identity.user_id, "failed to clear typing indicators");
    }

    match PresenceService::set_offline(&state.db, identity.user_id, connection_id.as_uuid()).await
    {
        Ok(true) => broadcast_presence(state, identity.user_id, PresenceStatus::Offline).await,
        // A newer login owns the presence entry; leave it alone.
        Ok(false) => {}
        Err(e) => error!(error = %e, user_id = %identity.user_id, "failed to set presence offline"),
    }
}

async fn handle_command_text(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    tx: &UnboundedSender<String>,
    text: &str,
) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            let err = AppError::BadRequest(format!("malformed command: {e}"));
            send_to_self(tx, &ServerEvent::from_error(&err));
            metrics::COMMANDS_TOTAL
                .with_label_values(&["invalid", "rejected"])
                .inc();
            return;
        }
    };

    let name = command.name();
    // Per-handler fault isolation: a failing command becomes one error
    // event on this connection and nothing else.
    match dispatch_command(state, identity, connection_id, tx, command).await {
        Ok(()) => {
            metrics::COMMANDS_TOTAL.with_label_values(&[name, "ok"]).inc();
        }
        Err(err) => {
            match &err {
                AppError::Database(_) | AppError::Internal => {
                    error!(error = %err, command = name, user_id = %identity.user_id, "command failed")
                }
                _ => warn!(error = %err, command = name, user_id = %identity.user_id, "command rejected"),
            }
            send_to_self(tx, &ServerEvent::from_error(&err));
            metrics::COMMANDS_TOTAL
                .with_label_values(&[name, "rejected"])
                .inc();
        }
    }
}

async fn dispatch_command(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    tx: &UnboundedSender<String>,
    command: ClientCommand,
) -> AppResult<()> {
    match command {
        ClientCommand::JoinRoom { room_id } => {
            handle_join_room(state, identity, connection_id, tx, room_id).await
        }
        ClientCommand::LeaveRoom { room_id } => {
            handle_leave_room(state, identity, connection_id, room_id).await
        }
        ClientCommand::DeleteRoom { room_id } => {
            handle_delete_room(state, identity, room_id).await
        }
        ClientCommand::SendMessage {
            room_id,
            message,
            message_type,
            file_url,
        } => {
            state.limiter.check(connection_id).await?;
            handle_send_message(state, identity, room_id, &message, &message_type, file_url).await
        }
        ClientCommand::TypingIndicator { room_id, is_typing } => {
            handle_typing(state, identity, connection_id, room_id, is_typing).await
        }
        ClientCommand::JoinExam { exam_id } => {
            handle_join_exam(state, identity, connection_id, tx, exam_id).await
        }
        ClientCommand::ExamProgress {
            exam_id,
            current_question,
            time_remaining,
            answers,
        } => {
            ExamService::save_progress(
                &state.db,
                exam_id,
                identity.user_id,
                current_question,
                time_remaining,
                &answers,
            )
            .await?;
            send_to_self(
                tx,
                &ServerEvent::ExamProgressSaved {
                    exam_id,
                    current_question,
                    time_remaining,
                },
            );
            Ok(())
        }
        ClientCommand::ExamComplete { exam_id } => {
            handle_exam_complete(state, identity, connection_id, tx, exam_id).await
        }
        ClientCommand::LeaderboardRequest {
            period,
            specialty,
            limit,
        } => handle_leaderboard_request(state, tx, period, specialty, limit).await,
        ClientCommand::LeaderboardRefresh => {
            if !identity.role.is_elevated() {
                return Err(AppError::Forbidden(
                    "leaderboard refresh requires an elevated role".into(),
                ));
            }
            crate::jobs::leaderboard::recompute_and_broadcast(state).await
        }
        ClientCommand::NotificationSend {
            user_id,
            notification_type,
            title,
            message,
            priority,
        } => {
            handle_notification_send(
                state,
                identity,
                user_id,
                &notification_type,
                &title,
                &message,
                priority.as_deref(),
            )
            .await
        }
        ClientCommand::NotificationRead { notification_id } => {
            NotificationService::mark_read(&state.db, notification_id, identity.user_id).await?;
            let unread_count =
                NotificationService::unread_count(&state.db, identity.user_id).await?;
            // Requester only; other connections of the same user are not told.
            send_to_self(tx, &ServerEvent::UnreadCount { unread_count });
            Ok(())
        }
        ClientCommand::NotificationReadAll => {
            NotificationService::mark_all_read(&state.db, identity.user_id).await?;
            let unread_count =
                NotificationService::unread_count(&state.db, identity.user_id).await?;
            send_to_self(tx, &ServerEvent::UnreadCount { unread_count });
            Ok(())
        }
        ClientCommand::Heartbeat => {
            PresenceService::touch(&state.db, identity.user_id).await?;
            send_to_self(tx, &ServerEvent::HeartbeatAck);
            Ok(())
        }
    }
}

async fn handle_join_room(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    tx: &UnboundedSender<String>,
    room_id: Uuid,
) -> AppResult<()> {
    // Unknown room ids are created on the fly with the joiner as creator;
    // join never errors on a missing room.
    let room =
        RoomService::ensure_room(&state.db, room_id, RoomKind::StudyGroup, identity.user_id)
            .await?;
    RoomService::add_participant(&state.db, room.id, identity.user_id).await?;

    state
        .registry
        .join_room(room.id, connection_id, identity.user_id, tx.clone())
        .await;
    PresenceService::set_current_room(&state.db, identity.user_id, Some(room.id)).await?;

    // History goes to the joining connection only, oldest first.
    let messages = MessageService::recent_history(&state.db, room.id, state.config.history_limit)
        .await?;
    send_to_self(
        tx,
        &ServerEvent::RoomHistory {
            room_id: room.id,
            messages,
        },
    );

    let joined = ServerEvent::ParticipantJoined {
        room_id: room.id,
        user_id: identity.user_id,
        display_name: identity.display_name.clone(),
    };
    if let Ok(payload) = joined.to_payload() {
        state
            .registry
            .broadcast_room(room.id, &payload, Some(connection_id))
            .await;
    }
    Ok(())
}

async fn handle_leave_room(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    room_id: Uuid,
) -> AppResult<()> {
    // Only live membership ends here; the durable participant set keeps
    // the identity for history and offline notification purposes.
    state.registry.leave_room(room_id, connection_id).await;
    PresenceService::set_current_room(&state.db, identity.user_id, None).await?;

    let event = ServerEvent::ParticipantLeft {
        room_id,
        user_id: identity.user_id,
    };
    if let Ok(payload) = event.to_payload() {
        state.registry.broadcast_room(room_id, &payload, None).await;
    }
    Ok(())
}

async fn handle_delete_room(state: &AppState, identity: &Identity, room_id: Uuid) -> AppResult<()> {
    let room = RoomService::get_room(&state.db, room_id)
        .await?
        .ok_or_else(|| AppError::NotFound("room".into()))?;

    if room.created_by != identity.user_id && !identity.role.is_elevated() {
        return Err(AppError::Forbidden(
            "only the room creator may delete it".into(),
        ));
    }

    // Tell live members before their multicast group disappears.
    if let Ok(payload) = (ServerEvent::RoomDeleted { room_id }).to_payload() {
        state.registry.broadcast_room(room_id, &payload, None).await;
    }
    state.registry.drop_room(room_id).await;
    PresenceService::clear_room_pointers(&state.db, room_id).await?;
    RoomService::delete_room(&state.db, room_id).await
}

async fn handle_send_message(
    state: &AppState,
    identity: &Identity,
    room_id: Uuid,
    message: &str,
    message_type: &str,
    file_url: Option<String>,
) -> AppResult<()> {
    let room = RoomService::get_room(&state.db, room_id)
        .await?
        .ok_or_else(|| AppError::NotFound("room".into()))?;

    let persisted = MessageService::persist_message(
        &state.db,
        &room,
        identity,
        message,
        message_type,
        file_url.as_deref(),
    )
    .await?;

    // Everyone live in the room, sender included, receives the persisted
    // record; there is no separate local echo.
    let event = ServerEvent::MessageNew {
        message: persisted.clone(),
    };
    if let Ok(payload) = event.to_payload() {
        state.registry.broadcast_room(room.id, &payload, None).await;
    }
    metrics::MESSAGES_ROUTED_TOTAL.inc();

    // Best-effort follow-ups for participants who missed the live fanout.
    // The message itself is already safely persisted; a failed notification
    // write is logged and skipped, never unwound.
    let participants = RoomService::participants(&state.db, room.id).await?;
    let live_in_room = state.registry.users_in_room(room.id).await;
    let preview: String = persisted.body.chars().take(120).collect();

    for participant in participants {
        if participant == identity.user_id || live_in_room.contains(&participant) {
            continue;
        }

        if state.registry.is_online(participant).await {
            // Online but sitting elsewhere: short-form live alert only.
            let alert = ServerEvent::MessageAlert {
                room_id: room.id,
                sender_id: identity.user_id,
                sender_name: identity.display_name.clone(),
                preview: preview.clone(),
            };
            if let Ok(payload) = alert.to_payload() {
                state.registry.send_to_user(participant, &payload).await;
            }
        } else {
            let created = NotificationService::create(
                &state.db,
                participant,
                Some(identity.user_id),
                "message",
                &format!("New message from {}", identity.display_name),
                &preview,
                "normal",
            )
            .await;
            if let Err(e) = created {
                warn!(error = %e, recipient = %participant, "failed to persist offline message notification");
            }
        }
    }

    Ok(())
}

async fn handle_typing(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    room_id: Uuid,
    is_typing: bool,
) -> AppResult<()> {
    TypingService::set_typing(&state.db, room_id, identity.user_id, is_typing).await?;

    let event = ServerEvent::TypingUpdate {
        room_id,
        user_id: identity.user_id,
        is_typing,
    };
    if let Ok(payload) = event.to_payload() {
        state
            .registry
            .broadcast_room(room_id, &payload, Some(connection_id))
            .await;
    }
    Ok(())
}

async fn handle_join_exam(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    tx: &UnboundedSender<String>,
    exam_id: Uuid,
) -> AppResult<()> {
    let exam = ExamService::get_exam(&state.db, exam_id).await?;

    // The exam room shares the exam's id; created lazily on first join.
    let room = RoomService::ensure_room(&state.db, exam.id, RoomKind::Exam, identity.user_id).await?;
    RoomService::add_participant(&state.db, room.id, identity.user_id).await?;

    let (session, resumed) = ExamService::join(&state.db, &exam, identity.user_id).await?;

    state
        .registry
        .join_room(room.id, connection_id, identity.user_id, tx.clone())
        .await;
    PresenceService::set_current_room(&state.db, identity.user_id, Some(room.id)).await?;

    send_to_self(
        tx,
        &ServerEvent::ExamJoined {
            exam_id: exam.id,
            current_question: session.current_question,
            time_remaining: session.time_remaining_seconds,
            resumed,
        },
    );

    let joined = ServerEvent::ParticipantJoined {
        room_id: room.id,
        user_id: identity.user_id,
        display_name: identity.display_name.clone(),
    };
    if let Ok(payload) = joined.to_payload() {
        state
            .registry
            .broadcast_room(room.id, &payload, Some(connection_id))
            .await;
    }

    let count = state.registry.room_connection_count(room.id).await;
    if let Ok(payload) = (ServerEvent::ExamParticipantCount {
        exam_id: exam.id,
        count,
    })
    .to_payload()
    {
        state.registry.broadcast_room(room.id, &payload, None).await;
    }
    Ok(())
}

async fn handle_exam_complete(
    state: &AppState,
    identity: &Identity,
    connection_id: ConnectionId,
    tx: &UnboundedSender<String>,
    exam_id: Uuid,
) -> AppResult<()> {
    let exam = ExamService::get_exam(&state.db, exam_id).await?;
    let result = ExamService::complete(&state.db, &exam, identity.user_id).await?;

    // Scored result goes to the completer alone.
    send_to_self(
        tx,
        &ServerEvent::ExamCompleted {
            exam_id: exam.id,
            result: result.clone(),
        },
    );

    // Durable private notification with the score.
    let created = NotificationService::create(
        &state.db,
        identity.user_id,
        None,
        "exam_result",
        &format!("Results for {}", exam.title),
        &format!(
            "You answered {} of {} correctly ({:.1}%)",
            result.correct_count, result.total_questions, result.score_percent
        ),
        "high",
    )
    .await;
    if let Err(e) = created {
        warn!(error = %e, user_id = %identity.user_id, "failed to persist exam result notification");
    }

    // Peers learn that the user finished, never the score.
    let announcement = ServerEvent::ExamParticipantCompleted {
        exam_id: exam.id,
        user_id: identity.user_id,
        display_name: identity.display_name.clone(),
    };
    if let Ok(payload) = announcement.to_payload() {
        state
            .registry
            .broadcast_room(exam.id, &payload, Some(connection_id))
            .await;
    }

    // Completion evicts the connection from the exam room.
    state.registry.leave_room(exam.id, connection_id).await;
    PresenceService::set_current_room(&state.db, identity.user_id, None).await?;

    let count = state.registry.room_connection_count(exam.id).await;
    if let Ok(payload) = (ServerEvent::ExamParticipantCount {
        exam_id: exam.id,
        count,
    })
    .to_payload()
    {
        state.registry.broadcast_room(exam.id, &payload, None).await;
    }
    Ok(())
}

async fn handle_leaderboard_request(
    state: &AppState,
    tx: &UnboundedSender<String>,
    period: Option<String>,
    specialty: Option<String>,
    limit: Option<i64>,
) -> AppResult<()> {
    let period = period.unwrap_or_else(|| "all".to_string());
    if !PERIODS.contains(&period.as_str()) {
        return Err(AppError::BadRequest(format!("unknown period: {period}")));
    }
    let specialty = specialty.unwrap_or_else(|| SPECIALTY_ALL.to_string());
    let limit = limit
        .unwrap_or(state.config.leaderboard_top_n)
        .clamp(1, 100);

    let entries = LeaderboardService::top(&state.db, &period, &specialty, limit).await?;
    send_to_self(
        tx,
        &ServerEvent::LeaderboardSnapshot {
            period,
            specialty,
            entries,
        },
    );
    Ok(())
}

async fn handle_notification_send(
    state: &AppState,
    identity: &Identity,
    target: Option<Uuid>,
    notification_type: &str,
    title: &str,
    message: &str,
    priority: Option<&str>,
) -> AppResult<()> {
    let recipient = target.unwrap_or(identity.user_id);
    if recipient != identity.user_id && !identity.role.is_elevated() {
        return Err(AppError::Forbidden(
            "notifying another user requires an elevated role".into(),
        ));
    }

    let priority = priority.unwrap_or("normal");
    if !matches!(priority, "low" | "normal" | "high") {
        return Err(AppError::BadRequest(format!("unknown priority: {priority}")));
    }
    if title.trim().is_empty() || message.trim().is_empty() {
        return Err(AppError::BadRequest("title and message are required".into()));
    }

    let notification = NotificationService::create(
        &state.db,
        recipient,
        Some(identity.user_id),
        notification_type,
        title,
        message,
        priority,
    )
    .await?;

    // Live push when any connection of the recipient is up; otherwise the
    // persisted row alone is the delivery.
    let event = ServerEvent::NotificationNew { notification };
    if let Ok(payload) = event.to_payload() {
        state.registry.send_to_user(recipient, &payload).await;
    }
    Ok(())
}
