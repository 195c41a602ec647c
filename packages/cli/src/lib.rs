//! # jsontree-cli
//!
//! Read and change a jsontree store from the shell.
//!
//! ## Usage
//!
//! ```bash
//! jsontree --root ./data get users/alice
//! jsontree --root ./data get users/alice --key profile.age
//! jsontree --root ./data set users/carol '{"age": 40}'
//! jsontree --root ./data set users/carol --key age 41
//! jsontree --root ./data delete users/carol
//! jsontree --root ./data dump
//! jsontree --root ./data watch
//! ```

pub mod commands;

pub use commands::{execute, CliError, Command};
