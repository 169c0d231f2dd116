use clap::{Args, Parser, Subcommand};
use hiproc_types::CommandId;

const PRINT_FLAG_NAME: &str = "print";
const PRINT_FLAG: &str = "--print";

/// Whether `--print` ended up among command arguments, where it would be passed to the shell.
pub fn has_trailing_print(arguments: &[String]) -> bool {
    arguments.iter().any(|argument| argument == PRINT_FLAG)
}

/// Save shell commands once and recall the right one from wherever you are.
///
/// Bare forms: `hp <id> [ARGS]`, `hp <namespace> <name> [ARGS]`, `hp <name> [ARGS]`.
/// Arguments in `KEY:VALUE` form fill `{{KEY}}` placeholders; anything else is appended.
/// `--print` goes before the query (`hp --print deploy`); after it, it would be an argument.
#[derive(Parser, Debug)]
#[command(name = "hp", version, about, allow_external_subcommands = true)]
pub struct Cli {
    /// Print the rendered command instead of running it (place before the query)
    #[arg(long = PRINT_FLAG_NAME, global = true)]
    pub print: bool,

    #[command(subcommand)]
    pub command: Option<Action>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Hints {
    /// Restrict to (and prefer) this namespace
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Restrict to this scope (`personal` or a team name)
    #[arg(long, short = 's')]
    pub scope: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    /// Command name (defaults to the first word of the command)
    #[arg(long)]
    pub name: Option<String>,

    /// Namespace (defaults to the detected project)
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Scope: `personal` (default) or a shared team name
    #[arg(long, short = 's')]
    pub scope: Option<String>,

    /// The command template, e.g. `kubectl logs -f {{POD}}`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub template: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Save a command template
    Save(SaveArgs),

    /// Save a command and run it right away
    Do(SaveArgs),

    /// Run a command by name, ranked against the current context
    Run {
        name: String,
        #[command(flatten)]
        hints: Hints,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a command by id
    Exec {
        id: CommandId,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show every candidate for a query in ranked order, optionally running one
    Candidates {
        /// `<id>`, `<name>` or `<namespace> <name>`
        #[arg(required = true, num_args = 1..=2)]
        query: Vec<String>,
        #[command(flatten)]
        hints: Hints,
        /// Run the candidate at this 1-based position
        #[arg(long)]
        pick: Option<usize>,
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List visible commands
    List {
        #[command(flatten)]
        hints: Hints,
        /// Only commands you own
        #[arg(long)]
        mine: bool,
    },

    /// Search names, namespaces and templates
    Search {
        text: String,
        #[arg(long, short = 'n')]
        namespace: Option<String>,
    },

    /// Show one command in detail
    Info { id: CommandId },

    /// Rename a command
    Rename {
        id: CommandId,
        name: String,
        #[arg(long, short = 'n')]
        namespace: Option<String>,
    },

    /// Replace a command's template
    Edit {
        id: CommandId,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        template: Vec<String>,
    },

    /// Delete a command
    Delete { id: CommandId },

    /// List namespaces with command counts
    Namespaces,

    /// Suggest commands for the current directory
    Suggest {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Commands related to a given one
    Similar {
        id: CommandId,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Execution statistics
    Analytics {
        #[arg(long, default_value_t = 30)]
        days: u32,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the detected project and what is saved for it
    Here,

    /// Manage secrets remembered in the OS keychain
    #[command(subcommand)]
    Secret(SecretAction),

    /// Show the effective configuration
    Config,

    #[command(external_subcommand)]
    Recall(Vec<String>),
}

#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a value for a placeholder name (read without echo)
    Set { name: String },
    /// Forget a stored value
    Remove { name: String },
}
