//! Feature modules

pub mod cpg;
pub mod data_flow;
pub mod file_watcher;
pub mod flow_graph;
pub mod node_identifier;
pub mod query_engine;
pub mod repository;
pub mod synchronizer;
