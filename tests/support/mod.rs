#![allow(dead_code)]

pub mod blog_api;
pub mod socket_guard;
