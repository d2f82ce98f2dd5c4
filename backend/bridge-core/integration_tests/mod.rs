mod bridge;
mod client;
mod helpers;
mod websocket;
