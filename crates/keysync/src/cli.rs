//! Clap derive structures for the `keysync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// keysync -- subscription VPN credential sync
#[derive(Debug, Parser)]
#[command(
    name = "keysync",
    version,
    about = "Sync subscription VPN keys into local tunnel profiles",
    long_about = "Logs in to the subscription control-plane, imports the keys it issues \
        as local tunnel profiles, keeps one profile active, and points the local \
        tunnel at it.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "KEYSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Control-plane URL (overrides config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Request timeout in seconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "KEYSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and import the keys issued to the account
    Login(LoginArgs),

    /// Continue a remembered session without a fresh login
    Resume,

    /// Import key material (share links or a subscription blob)
    Import(ImportArgs),

    /// List and import keys issued to the account
    Keys(KeysArgs),

    /// Show available plans and payment details
    Plans,

    /// Upload a payment slip and import the purchased key
    Pay(PayArgs),

    /// Show subscription status for the active profile
    Status(StatusArgs),

    /// Manage local tunnel profiles
    #[command(alias = "p")]
    Profiles(ProfilesArgs),

    /// Inspect the persisted session
    Session(SessionArgs),

    /// Stop the tunnel and forget the session
    Logout,

    /// Forget the remembered identity before logging in as someone else
    SwitchAccount,

    /// Query and drive the local tunnel
    #[command(alias = "t")]
    Tunnel(TunnelArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[command(subcommand)]
    pub command: LoginCommand,
}

#[derive(Debug, Subcommand)]
pub enum LoginCommand {
    /// Log in with a Google ID token
    Google {
        /// ID token (prompted for when omitted)
        #[arg(long, env = "KEYSYNC_ID_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Do not store the token in the system keyring
        #[arg(long)]
        no_remember: bool,
    },

    /// Log in with a phone number
    Phone {
        /// Phone number in international format
        number: String,
    },
}

// ── Import ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Key material, or `-` to read it from stdin
    pub key: String,
}

// ── Keys ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// List keys issued to the logged-in account
    #[command(alias = "ls")]
    List,

    /// Import one issued key by id
    Import {
        /// Issued key id (see `keys list`)
        id: i64,
    },
}

// ── Payment ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PayArgs {
    /// Payment slip image
    #[arg(long)]
    pub slip: PathBuf,

    /// Protocol plan code (see `plans`)
    #[arg(long)]
    pub protocol: String,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Keep refreshing until interrupted
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Refresh interval in seconds when watching (defaults to config)
    #[arg(long, requires = "watch")]
    pub interval: Option<u64>,
}

// ── Profiles ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    /// List stored profiles
    #[command(alias = "ls")]
    List,

    /// Show one profile
    Show {
        /// Profile id
        id: String,
    },

    /// Make a profile active and point the tunnel at it
    Select {
        /// Profile id
        id: String,
    },

    /// Delete a profile (the active profile cannot be deleted)
    #[command(alias = "rm")]
    Delete {
        /// Profile id
        id: String,
    },
}

// ── Session ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Show the persisted session state
    Show,
}

// ── Tunnel ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TunnelArgs {
    #[command(subcommand)]
    pub command: TunnelCommand,
}

#[derive(Debug, Subcommand)]
pub enum TunnelCommand {
    /// Print the tunnel run state
    State,
    /// Start the tunnel on the active profile
    Start,
    /// Stop the tunnel
    Stop,
    /// Reload a running tunnel or start a stopped one
    Resync,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets masked)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
