//! Library root for the `verdict_gate` crate
//! Deterministic enforcement decisions over candidate responses and actions

// Core error handling
pub mod errors;

// Canonical encoding & identity
pub mod canonicalize;
pub mod trace_identity;

// Input contract
pub mod decision_input;

// Evaluation
pub mod evaluator;
pub mod evaluators;

// Behavioral classifier
pub mod behavior_classifier;
pub mod classifier_adapter;
pub mod pattern_library;

// Resolution
pub mod resolver;
pub mod verdict;

// Engine & action control
pub mod action_gate;
pub mod engine;

// Audit & replay
pub mod audit_log;
pub mod audit_store_sled;
pub mod replay;

// Configuration & CLI
pub mod cli;
pub mod config_loader;

// Web server interface
pub mod gateweb;
