use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mdc-uploader",
    version,
    about = "Upload marketing data through Azure Blob Storage and a Databricks notebook",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Log progress of every remote call")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in to the MDC backend.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MDC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MDC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Change the signed-in user's password.
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },

    /// Run the upload wizard for a spreadsheet.
    Upload {
        #[arg(help = "Spreadsheet to upload (.xlsx, .xls, .xlsm, .xlsb, .ods or .csv)")]
        file: PathBuf,

        #[arg(long, help = "Data source, e.g. google_ads or Google")]
        source: String,

        #[arg(long, help = "Sheet to preview instead of the first one with data")]
        sheet: Option<String>,

        #[arg(long, help = "Save progress after the upload instead of running the notebook")]
        pause_at_execute: bool,

        #[arg(long, help = "Write the notebook output to this CSV file")]
        output: Option<PathBuf>,
    },

    /// Continue the upload in progress, or a paused one from history.
    Resume {
        #[arg(long, help = "Task id of a paused upload")]
        task_id: Option<String>,

        #[arg(long, help = "Save progress again before running the notebook")]
        pause_at_execute: bool,

        #[arg(long, help = "Write the notebook output to this CSV file")]
        output: Option<PathBuf>,
    },

    /// Show the upload in progress.
    Status {
        #[arg(long, help = "Preview page to show (20 rows per page)", default_value_t = 1)]
        page: usize,
    },

    /// Save the upload in progress to history and start over.
    Pause,

    /// List your uploads.
    History,

    /// Upload totals and recent activity.
    Dashboard,

    /// List the notebooks available to run.
    Notebooks,

    /// Look up a notebook run once.
    RunStatus {
        run_id: u64,
    },
}
