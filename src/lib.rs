pub mod analytics;
pub mod classify;
pub mod clicks;
pub mod config;
pub mod http;
pub mod models;
pub mod ratelimit;
pub mod resolver;
pub mod storage;
