//! CLI argument definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::api::VideoStatus;

/// vidjot - Video journal uploads with live AI processing progress
#[derive(Parser, Debug)]
#[command(name = "vidjot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with the journal password
    Login {
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored credentials
    Logout,

    /// Upload a video and start AI processing
    Upload {
        /// Video file to upload
        file: PathBuf,

        /// Follow processing progress once the upload is handed off
        #[arg(short, long)]
        watch: bool,
    },

    /// List videos in the journal
    List {
        /// Only show videos with this status
        #[arg(short, long, value_enum)]
        status: Option<StatusFilter>,

        /// Only show videos with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum number of videos to show
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show a video's title, summary, tags and transcript
    View {
        /// Video ID
        id: String,
    },

    /// Start (or restart) AI processing for a video
    Process {
        /// Video ID
        id: String,

        /// Follow processing progress
        #[arg(short, long)]
        watch: bool,
    },

    /// Follow processing progress for a video
    Watch {
        /// Video ID
        id: String,

        /// Poll the video's status instead of using the progress stream
        #[arg(long)]
        poll: bool,
    },

    /// Delete a video and its stored file
    Delete {
        /// Video ID
        id: String,
    },

    /// List every tag in use
    Tags,

    /// Check configuration, credentials and backend reachability
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Video status accepted by `list --status`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl From<StatusFilter> for VideoStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => VideoStatus::Pending,
            StatusFilter::Processing => VideoStatus::Processing,
            StatusFilter::Ready => VideoStatus::Ready,
            StatusFilter::Failed => VideoStatus::Failed,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}
