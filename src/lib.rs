#![forbid(unsafe_code)]

//! VideoTube: a video-sharing REST backend and the client state layer that
//! talks to it.
//!
//! The `backend` binary wires [`store::Database`], [`media::LocalMediaStorage`]
//! and [`tokens::TokenService`] into the axum router from [`api`]. The
//! `videotube` binary drives [`client::Store`] from the command line.

pub mod api;
pub mod client;
pub mod config;
pub mod media;
pub mod models;
pub mod security;
pub mod store;
pub mod tokens;
