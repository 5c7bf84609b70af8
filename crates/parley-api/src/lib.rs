pub mod access;
pub mod auth;
pub mod channels;
pub mod conversations;
pub mod error;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod pagination;
pub mod reactions;
pub mod routes;
pub mod shaping;
pub mod state;
pub mod storage;
pub mod upload;
pub mod users;
pub mod workspaces;
