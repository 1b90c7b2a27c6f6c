//! Core pipeline for the GitLab deployment CLI
//!
//! Parameter resolution, validation, reference building, bootstrap script
//! generation, and plan assembly are synchronous and pure; only the AWS
//! executor layer in [`aws`] talks to the provider.

pub mod aws;
pub mod config;
pub mod error;
pub mod plan;
pub mod refs;
pub mod user_data;
