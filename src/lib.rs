#[macro_use]
extern crate diesel;

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
mod query;
pub mod rating;
pub mod recommend;
mod schema;
pub mod state;
pub mod store;
