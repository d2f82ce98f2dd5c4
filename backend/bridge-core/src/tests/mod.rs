mod envelope;
mod fixtures;
mod handshake;
mod marshal;
mod schema;
