pub mod cohort;
pub mod config;
pub mod discretize;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod event;
pub mod fcs_imputer;
pub mod frame;
pub mod imputer;
pub mod layout;
pub mod linalg;
pub mod missingness;
pub mod mvn_imputer;
pub mod pooling;
pub mod rng;
pub mod sampler;
pub mod scoring;
pub mod store;
pub mod strategy;
pub mod types;
