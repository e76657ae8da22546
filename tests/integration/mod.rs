//! Integration tests for dedupfs

mod cli_contracts;
mod properties;
mod sharing;
mod support;
mod transfer;
