#![allow(async_fn_in_trait)]
pub mod bbox;
pub mod bucket;
pub mod config;
pub mod credentials;
pub mod download_plan;
pub mod entry_filter;
pub mod error;
pub mod eumetsat;
pub mod fci;
pub mod firms;
pub mod hls;
pub mod http;
pub mod lsasaf;
pub mod s3;
pub mod sentinel3_frp;
pub mod vector;
pub mod window;

#[cfg(test)]
mod test_server;
