//! Inbound frame handling: acknowledgments, rejections, and what reaches the queue.

use super::*;
use lib_core::model::store::ChatForCreate;
use shared::utils::DEFAULT_CHAT_NAME;

async fn chat_count(pool: &DbPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chats")
        .fetch_one(pool)
        .await
        .unwrap()
}

fn error_text(frame: &ServerFrame) -> &str {
    match frame {
        ServerFrame::Error { text, .. } => text,
        other => panic!("expected error frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_message_creates_chat_and_enqueues() {
    let mut t = test_gateway().await;

    let frames = t.send(r#"{"text":"hello"}"#).await;
    assert_eq!(frames.len(), 2);

    let (chat_id, session_id, task_id) = match &frames[0] {
        ServerFrame::ChatCreated {
            chat_id,
            chat_name,
            session_id,
            task_id,
        } => {
            assert_eq!(chat_name, "hello");
            (chat_id.clone(), session_id.clone(), task_id.clone())
        }
        other => panic!("expected chat_created, got {:?}", other),
    };

    match &frames[1] {
        ServerFrame::MessageReceived {
            chat_id: acked_chat,
            task_id: acked_task,
            ..
        } => {
            assert_eq!(acked_chat, &chat_id);
            assert_eq!(acked_task, &task_id);
        }
        other => panic!("expected message_received, got {:?}", other),
    }

    let (task, jwt) = t.claim_task().await.expect("task should be enqueued");
    assert_eq!(task.task_id, task_id);
    assert_eq!(task.chat_id, chat_id);
    assert_eq!(task.session_id, session_id);
    assert_eq!(task.user_id, "u1");
    assert_eq!(task.message_text, "hello");
    assert_eq!(task.origin_connection_id.as_deref(), Some(t.conn.id()));

    let claims = decode_delegated_token(&jwt, DELEGATED_SECRET).unwrap();
    assert_eq!(claims.task_id, task_id);
    assert_eq!(claims.chat_id, chat_id);
    assert!(claims.exp - claims.iat <= 300);

    assert!(t.gateway.registry().lookup_task(&task_id).await.is_some());

    let chat = ChatRepository::find_by_id(&t.pool, &chat_id).await.unwrap().unwrap();
    assert_eq!(chat.user_messages_count, 1);
    let messages = ChatRepository::list_messages(&t.pool, &chat_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_user_message);
    assert_eq!(messages[0].user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_message_to_existing_chat() {
    let mut t = test_gateway().await;
    let chat = ChatRepository::create(&t.pool, &ChatForCreate::new("u1", "earlier", "s1"))
        .await
        .unwrap();

    let frames = t
        .send(&format!(r#"{{"chatId":"{}","text":"and another"}}"#, chat.id))
        .await;

    assert_eq!(frames.len(), 1);
    assert!(matches!(&frames[0], ServerFrame::MessageReceived { chat_id, .. } if chat_id == &chat.id));

    let (task, _) = t.claim_task().await.unwrap();
    assert_eq!(task.session_id, "s1");

    let chat = ChatRepository::find_by_id(&t.pool, &chat.id).await.unwrap().unwrap();
    assert_eq!(chat.user_messages_count, 1);
}

#[tokio::test]
async fn test_foreign_chat_is_not_found() {
    let mut t = test_gateway().await;
    let chat = ChatRepository::create(&t.pool, &ChatForCreate::new("u2", "theirs", "s1"))
        .await
        .unwrap();

    let frames = t
        .send(&format!(r#"{{"chatId":"{}","text":"hello"}}"#, chat.id))
        .await;

    assert_eq!(frames.len(), 1);
    assert_eq!(error_text(&frames[0]), CHAT_NOT_FOUND);
    assert!(frames[0].task_id().is_some());
    assert!(t.claim_task().await.is_none());
}

#[tokio::test]
async fn test_unknown_chat_is_not_found() {
    let mut t = test_gateway().await;
    let frames = t.send(r#"{"chatId":"missing","text":"hello"}"#).await;

    assert_eq!(error_text(&frames[0]), CHAT_NOT_FOUND);
    assert!(t.claim_task().await.is_none());
}

#[tokio::test]
async fn test_closed_chat_is_rejected() {
    let mut t = test_gateway().await;
    let chat = ChatRepository::create(&t.pool, &ChatForCreate::new("u1", "done", "s1"))
        .await
        .unwrap();
    ChatRepository::close(&t.pool, &chat.id).await.unwrap();

    let frames = t
        .send(&format!(r#"{{"chatId":"{}","text":"hello"}}"#, chat.id))
        .await;

    assert_eq!(frames.len(), 1);
    assert_eq!(error_text(&frames[0]), CHAT_CLOSED);
    assert!(t.claim_task().await.is_none());

    let messages = ChatRepository::list_messages(&t.pool, &chat.id).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_empty_first_message_creates_default_named_chat_only() {
    let mut t = test_gateway().await;

    let frames = t.send(r#"{"text":""}"#).await;

    let kinds: Vec<&str> = frames.iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, ["chat_created", "error"]);
    assert_eq!(error_text(&frames[1]), EMPTY_MESSAGE);
    assert_eq!(frames[1].task_id(), frames[0].task_id());

    let chat_id = match &frames[0] {
        ServerFrame::ChatCreated { chat_id, chat_name, .. } => {
            assert_eq!(chat_name, DEFAULT_CHAT_NAME);
            chat_id.clone()
        }
        other => panic!("expected chat_created, got {:?}", other),
    };

    assert_eq!(chat_count(&t.pool).await, 1);
    let chat = ChatRepository::find_by_id(&t.pool, &chat_id).await.unwrap().unwrap();
    assert_eq!(chat.name, DEFAULT_CHAT_NAME);
    assert_eq!(chat.user_messages_count, 0);
    assert!(ChatRepository::list_messages(&t.pool, &chat_id).await.unwrap().is_empty());
    assert!(t.claim_task().await.is_none());
    assert_eq!(t.gateway.registry().task_count().await, 0);
}

#[tokio::test]
async fn test_whitespace_first_message_is_rejected_after_chat_created() {
    let mut t = test_gateway().await;

    let frames = t.send(r#"{"text":"   "}"#).await;

    let kinds: Vec<&str> = frames.iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, ["chat_created", "error"]);
    assert_eq!(error_text(&frames[1]), EMPTY_MESSAGE);
    assert!(t.claim_task().await.is_none());
}

#[tokio::test]
async fn test_empty_message_to_existing_chat() {
    let mut t = test_gateway().await;
    let chat = ChatRepository::create(&t.pool, &ChatForCreate::new("u1", "earlier", "s1"))
        .await
        .unwrap();

    let frames = t.send(&format!(r#"{{"chatId":"{}"}}"#, chat.id)).await;

    assert_eq!(error_text(&frames[0]), EMPTY_MESSAGE);
    let chat = ChatRepository::find_by_id(&t.pool, &chat.id).await.unwrap().unwrap();
    assert_eq!(chat.user_messages_count, 0);
}

#[tokio::test]
async fn test_oversized_message_is_rejected() {
    let mut t = test_gateway().await;
    let text = "я".repeat(MAX_MESSAGE_CHARS + 1);

    let frames = t.send(&format!(r#"{{"text":"{}"}}"#, text)).await;

    assert_eq!(frames[0].kind(), "chat_created");
    assert_eq!(error_text(&frames[1]), MESSAGE_TOO_LONG);
    assert_eq!(chat_count(&t.pool).await, 1);
    assert!(t.claim_task().await.is_none());
}

#[tokio::test]
async fn test_malformed_frame() {
    let mut t = test_gateway().await;

    let frames = t.send("not json at all").await;

    assert_eq!(frames.len(), 1);
    assert_eq!(error_text(&frames[0]), MALFORMED_FRAME);
    assert!(frames[0].task_id().is_some());
}

#[tokio::test]
async fn test_long_first_message_names_chat_with_fifty_chars() {
    let mut t = test_gateway().await;
    let text = "ж".repeat(120);

    let frames = t.send(&format!(r#"{{"text":"{}"}}"#, text)).await;

    match &frames[0] {
        ServerFrame::ChatCreated { chat_name, .. } => assert_eq!(chat_name.chars().count(), 50),
        other => panic!("expected chat_created, got {:?}", other),
    }
    let (task, _) = t.claim_task().await.unwrap();
    assert_eq!(task.message_text, text);
}

#[tokio::test]
async fn test_every_message_gets_its_own_task() {
    let mut t = test_gateway().await;

    let first = t.send(r#"{"text":"one"}"#).await;
    let second = t.send(r#"{"text":"two"}"#).await;

    assert_ne!(first[0].task_id(), second[0].task_id());
    assert_eq!(t.gateway.registry().task_count().await, 2);
}

#[tokio::test]
async fn test_queue_failure_reports_error_and_unbinds() {
    let pool = setup_test_db().await;
    let gateway = Gateway::new(
        Arc::new(SqliteChatStore::new(pool)),
        Arc::new(UnreachableQueue),
        test_minter(),
        ConnectionRegistry::new(),
    );
    let (conn, mut rx) = ConnectionHandle::new("u1");
    gateway.registry().register(conn.clone()).await;

    gateway.handle_frame(&conn, br#"{"text":"hello"}"#).await;

    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    let kinds: Vec<&str> = frames.iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, ["chat_created", "message_received", "error"]);
    assert_eq!(frames[2].task_id(), frames[1].task_id());
    assert_eq!(gateway.registry().task_count().await, 0);
}
