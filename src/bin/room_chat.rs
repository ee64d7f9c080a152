use roommate_chat::client::utils::session_store;
use roommate_chat::client::views::message_list;
use roommate_chat::client::{ChatConfig, ChatSession, HttpChatApi, SessionContext, WsConnector};
use roommate_chat::utils::logger::ChatLogger;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // loads .env before the logger reads LOG_LEVEL
    let config = ChatConfig::from_env();
    ChatLogger::init();
    config.log_summary();

    let mut input = BufReader::new(stdin()).lines();
    let token = match session_store::load_auth_token() {
        Some(token) => token,
        None => {
            println!("[CLIENT] No saved session, paste your auth token:");
            let Some(line) = input.next_line().await? else {
                return Ok(());
            };
            let token = line.trim().to_string();
            if token.is_empty() {
                anyhow::bail!("no auth token given");
            }
            if let Err(e) = session_store::save_auth_token(&token) {
                log::warn!("[CLIENT] Token not saved: {}", e);
            }
            token
        }
    };

    let session = SessionContext::new(Some(token));
    let api = Arc::new(HttpChatApi::new(&config.api_base_url, &session)?);
    let connector = Arc::new(WsConnector::new(config.websocket_url()?));
    let chat = ChatSession::open(&config, session, api, connector).await;

    match chat.room().room {
        Some(room) => println!(
            "[CLIENT] Room #{} \"{}\" ({}/{} members{})",
            room.id,
            room.name,
            room.current_user_count,
            room.max_member_count,
            if room.is_recruiting() { ", recruiting" } else { "" }
        ),
        None => println!("[CLIENT] You are not in a chat room yet"),
    }
    println!("[CLIENT] Type a message and press enter. /refresh, /logout, /quit");

    let me = chat.current_user().map(|u| u.id);
    let mut messages = chat.messages();
    let printer = tokio::spawn(async move {
        let mut shown = HashSet::new();
        while messages.changed().await.is_ok() {
            let snapshot = messages.borrow_and_update().clone();
            if snapshot.is_empty() {
                // room switched or left
                shown.clear();
                continue;
            }
            for row in message_list::rows(&snapshot, me) {
                if shown.insert(row.id.clone()) {
                    println!("{}", row.line());
                }
            }
        }
    });

    let mut status = chat.status();
    let status_printer = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            println!("[CLIENT] {:?} (room {:?})", current.state, current.room_id);
        }
    });

    while let Some(line) = input.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/refresh" => match chat.refresh_room().await {
                Some(room_id) => println!("[CLIENT] Bound to room {}", room_id),
                None => println!("[CLIENT] No active room"),
            },
            "/logout" => {
                session_store::clear_auth_token()?;
                println!("[CLIENT] Logged out");
                break;
            }
            text => {
                if let Err(e) = chat.send_message(text).await {
                    println!("[ALERT] {}", e);
                }
            }
        }
    }

    printer.abort();
    status_printer.abort();
    chat.close().await;
    Ok(())
}
