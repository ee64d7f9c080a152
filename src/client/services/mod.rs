pub mod api_client;
pub mod chat_session;
pub mod connection_handle;
pub mod connection_manager;
pub mod message_store;
pub mod room_binder;
pub mod transport;
