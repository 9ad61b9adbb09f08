//! Marketing data upload wizard.
//!
//! A spreadsheet is previewed locally, uploaded to Azure Blob Storage and
//! processed by a Databricks notebook picked by data source. The result is
//! read back from blob storage. Job records and the in-progress wizard state
//! survive restarts.

pub mod backend;
pub mod blob;
pub mod cli;
pub mod commands;
pub mod config;
pub mod databricks;
pub mod error;
pub mod events;
pub mod http;
pub mod sheet;
pub mod state;
pub mod storage;
pub mod workflow;
