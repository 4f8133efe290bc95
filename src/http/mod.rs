// src/http/mod.rs
pub mod client;
pub mod retry;

pub use client::{FetchedBytes, FetchedPage, HttpClient};
