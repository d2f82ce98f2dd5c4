mod error;
mod handlers;
