//! Shared application state

use std::sync::Arc;

use crate::{
    auth::JwtManager,
    calls::CallQueue,
    chat::ChatRouter,
    clock::{Clock, SystemClock},
    config::Config,
    store::{CallStore, MemoryStore, MessageStore},
    websocket::WebSocketState,
};

/// State handed to every route and WebSocket session
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub ws_state: WebSocketState,
    pub calls: Arc<CallQueue>,
    pub chat: Arc<ChatRouter>,
}

impl AppState {
    pub fn new(
        config: Config,
        call_store: Arc<dyn CallStore>,
        message_store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ws_state = WebSocketState::new();
        let calls = CallQueue::new(call_store, ws_state.clone(), Arc::clone(&clock));
        let chat = ChatRouter::new(
            message_store,
            ws_state.clone(),
            clock,
            config.chat_max_message_chars,
        );

        Self {
            jwt: JwtManager::new(&config.jwt_secret),
            config: Arc::new(config),
            ws_state,
            calls: Arc::new(calls),
            chat: Arc::new(chat),
        }
    }

    /// State backed by a fresh `MemoryStore` and the system clock
    pub fn in_memory(config: Config) -> Self {
        let store = MemoryStore::new();
        Self::new(
            config,
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(SystemClock),
        )
    }
}
