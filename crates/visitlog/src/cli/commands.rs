//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::models::Role;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind to (overrides configuration)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Operator account commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create an operator account
    Create {
        /// Login name
        #[arg(short, long)]
        login: String,

        /// Password (at least 6 characters)
        #[arg(short, long)]
        password: String,

        /// Access level
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,

        /// Display name
        #[arg(long)]
        full_name: Option<String>,
    },

    /// Block an operator from logging in
    Disable {
        /// Login name
        login: String,
    },

    /// Allow a disabled operator to log in again
    Enable {
        /// Login name
        login: String,
    },

    /// List operator accounts
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Visit commands.
#[derive(Debug, Subcommand)]
pub enum VisitCommand {
    /// List recent visits
    List {
        /// Maximum number of visits
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only visits not yet checked out
        #[arg(long)]
        open: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Operator role for CLI arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Manages users and cameras
    Admin,
    /// Registers visitors
    User,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}
