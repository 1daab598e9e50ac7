pub mod context;
pub mod condition;
pub mod flow;
pub mod activity;
pub mod gateway;
pub mod graph;
pub mod listener;
pub mod state;
pub mod process;
pub mod engine;
pub mod storage;
