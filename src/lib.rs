pub mod account;
pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod media;
pub mod migration;
pub mod page_cache;
pub mod paginator;
pub mod web;
