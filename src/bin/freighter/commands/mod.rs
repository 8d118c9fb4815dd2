//! Command implementations

pub mod build;
pub mod completions;
pub mod create;
pub mod doctor;
pub mod new;
pub mod package;
pub mod publish;
pub mod run;
pub mod update;

pub mod support;
