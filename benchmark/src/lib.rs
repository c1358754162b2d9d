pub mod ping_pong;
