#![allow(dead_code)]

pub mod engine_env;
