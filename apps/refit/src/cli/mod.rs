//! Command line interface for refit

mod output;
mod requests;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use refit_config::AppConfig;
use refit_foundation::protocol::requests::{ExtractScope, ParamSpec};
use refit_foundation::{PlanOptions, RefactorRequest, SymbolKind};
use refit_services::{BatchFile, RefactorEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The main CLI struct.
#[derive(Parser, Debug)]
#[command(name = "refit")]
#[command(about = "Semantics-preserving refactoring for Go workspaces")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Workspace root; relative file arguments are resolved against it
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<PathBuf>,

    /// Plan and print the diff without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print plans, results and errors as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Proceed despite soft errors (dangling references, side effects)
    #[arg(long, global = true)]
    pub force: bool,

    /// Keep `.bak.<timestamp>` copies of every modified file
    #[arg(long, global = true)]
    pub backup: bool,

    /// Restrict edits to the declaring package
    #[arg(long, global = true)]
    pub package_only: bool,

    /// Create the target package of a move when it does not exist
    #[arg(long, global = true)]
    pub create_target: bool,

    /// Skip the type check after writing
    #[arg(long, global = true)]
    pub skip_compilation: bool,

    /// Allow visibility loss and removed arguments
    #[arg(long, global = true)]
    pub allow_breaking: bool,

    /// Also rename the method on every implementation of an interface
    #[arg(long, global = true)]
    pub rename_implementations: bool,

    /// Threshold for `complexity`
    #[arg(long, global = true, default_value_t = 10)]
    pub min_complexity: u32,
}

impl GlobalArgs {
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            allow_breaking: self.allow_breaking,
            force: self.force,
        }
    }
}

/// The available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move a package-level symbol into another package
    Move {
        symbol: String,
        /// Source package (name, directory or import path)
        #[arg(long)]
        from: String,
        /// Target package import path
        #[arg(long)]
        to: String,
        /// Destination file inside the target package
        #[arg(long)]
        target_file: Option<PathBuf>,
    },
    /// Rename a symbol (`Name`, `Type.Method`) or the local at FILE:LINE:COLUMN
    Rename {
        target: String,
        new_name: String,
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        kind: Option<SymbolKind>,
    },
    /// Extract code into a new declaration
    #[command(subcommand)]
    Extract(ExtractCommand),
    /// Replace uses of a declaration with its body or value
    #[command(subcommand)]
    Inline(InlineCommand),
    /// Change a declaration in place
    #[command(subcommand)]
    Change(ChangeCommand),
    /// Delete a symbol that has no remaining uses
    Delete {
        symbol: String,
        /// File declaring the symbol
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        kind: Option<SymbolKind>,
    },
    /// Apply the requests of a JSON file as one plan
    Batch { file: PathBuf },
    /// Summarize the workspace, or describe one symbol
    Analyze {
        symbol: Option<String>,
        #[arg(long)]
        package: Option<String>,
    },
    /// List functions at or above `--min-complexity`
    Complexity,
    /// Print the effective configuration as TOML
    Config,
    /// Run the editor protocol server
    Serve {
        /// Serve over stdin/stdout (the default)
        #[arg(long, conflicts_with = "tcp")]
        stdio: bool,
        /// Listen on ADDR, or on the configured host and port
        #[arg(long, value_name = "ADDR")]
        tcp: Option<Option<String>>,
    },
}

/// Statement range arguments
#[derive(Args, Debug, Clone)]
pub struct LineRange {
    #[arg(long)]
    pub file: PathBuf,
    #[arg(long)]
    pub start_line: u32,
    #[arg(long)]
    pub end_line: u32,
}

/// 1-based cursor arguments
#[derive(Args, Debug, Clone)]
pub struct Cursor {
    #[arg(long)]
    pub file: PathBuf,
    #[arg(long)]
    pub line: u32,
    #[arg(long)]
    pub column: u32,
}

#[derive(Subcommand, Debug)]
pub enum ExtractCommand {
    /// Statements into a new function
    Function {
        #[command(flatten)]
        lines: LineRange,
        #[arg(long)]
        name: String,
    },
    /// Statements into a new method on RECEIVER
    Method {
        #[command(flatten)]
        lines: LineRange,
        #[arg(long)]
        name: String,
        #[arg(long)]
        receiver: String,
    },
    /// Method set of a type into a new interface
    Interface {
        #[arg(long = "type")]
        source_type: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        target_package: String,
        /// Method to include; repeat for several (default: all exported)
        #[arg(long = "method")]
        methods: Vec<String>,
        #[arg(long)]
        source_package: Option<String>,
        #[arg(long)]
        update_call_sites: bool,
    },
    /// An expression into a local variable
    Variable {
        #[command(flatten)]
        lines: LineRange,
        #[arg(long)]
        name: String,
        #[arg(long)]
        expression: Option<String>,
        #[arg(long, value_parser = requests::parse_extract_scope)]
        scope: Option<ExtractScope>,
    },
    /// A literal into a named constant
    Constant {
        #[command(flatten)]
        at: Cursor,
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = requests::parse_extract_scope)]
        scope: Option<ExtractScope>,
    },
    /// The block under the cursor into a new function
    Block {
        #[command(flatten)]
        at: Cursor,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum InlineCommand {
    Function {
        name: String,
        #[arg(long)]
        file: PathBuf,
        /// Only inline call sites in this file; repeat for several
        #[arg(long = "target")]
        targets: Vec<PathBuf>,
    },
    Method {
        method: String,
        #[arg(long)]
        receiver: String,
        #[arg(long)]
        target_file: Option<PathBuf>,
    },
    Variable {
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "target")]
        targets: Vec<PathBuf>,
        /// Declaration line when several locals share the name
        #[arg(long)]
        line: Option<u32>,
    },
    Constant {
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "target")]
        targets: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChangeCommand {
    /// Reorder, add or remove parameters and results
    Signature {
        function: String,
        #[arg(long)]
        file: PathBuf,
        /// NAME:TYPE[@FROM_INDEX][=DEFAULT]; repeat in the new order
        #[arg(long = "param", value_parser = requests::parse_param)]
        params: Vec<ParamSpec>,
        /// New result type; repeat for several
        #[arg(long = "returns")]
        returns: Vec<String>,
        /// Remove every result
        #[arg(long, conflicts_with = "returns")]
        no_results: bool,
        /// Receiver type when FUNCTION is a method
        #[arg(long)]
        receiver: Option<String>,
    },
}

/// Requests planned by one invocation
enum Work {
    Single(RefactorRequest),
    Batch(Vec<RefactorRequest>),
}

fn load_config(root: &Path, global: &GlobalArgs) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(Some(root)).context("Failed to load configuration")?;
    if global.verbose {
        config.logging.level = "debug".to_string();
    }
    if global.skip_compilation {
        config.execution.skip_compilation = true;
    }
    if global.backup {
        config.execution.cleanup_backups = false;
    }
    Ok(config)
}

/// Parse arguments, run the command and return the process exit code
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let json = cli.global.json;
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => output::report_error(&err, json),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    let root = global
        .workspace
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_config(&root, &global)?;
    refit_config::logging::initialize(&config);
    debug!(root = %root.display(), "Workspace root");

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(0)
        }
        Commands::Serve { stdio, tcp } => {
            debug!(stdio, "Starting editor server");
            let engine = Arc::new(RefactorEngine::open(&root, config.clone()).await?);
            match tcp {
                Some(addr) => {
                    let addr = addr.unwrap_or_else(|| {
                        format!("{}:{}", config.server.host, config.server.port)
                    });
                    refit_lsp::run_tcp(engine, &addr).await?;
                }
                None => refit_lsp::run_stdio(engine).await?,
            }
            Ok(0)
        }
        Commands::Analyze { symbol, package } => {
            let engine = RefactorEngine::open(&root, config).await?;
            match symbol {
                Some(name) => {
                    let report = engine.describe(&name, package.as_deref()).await?;
                    let root = engine.read(|ws| ws.root.clone()).await;
                    output::symbol_report(&report, &root, global.json)?;
                }
                None => output::summary(&engine.summary().await, global.json)?,
            }
            Ok(0)
        }
        Commands::Complexity => {
            let engine = RefactorEngine::open(&root, config).await?;
            let entries = engine.complexity(global.min_complexity).await;
            output::complexity(&entries, global.min_complexity, global.json)?;
            Ok(0)
        }
        Commands::Batch { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read batch file {}", file.display()))?;
            let requests = BatchFile::parse(&text)?;
            refactor(&root, config, &global, Work::Batch(requests)).await
        }
        command => {
            let request = requests::from_command(command, &global)?;
            refactor(&root, config, &global, Work::Single(request)).await
        }
    }
}

async fn refactor(root: &Path, config: AppConfig, global: &GlobalArgs, work: Work) -> anyhow::Result<i32> {
    let options = global.plan_options();
    let engine = RefactorEngine::open(root, config).await?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let plan = match work {
        Work::Single(request) => engine.plan(request, options).await?,
        Work::Batch(requests) => engine.plan_batch(requests, options).await?,
    };
    let root = engine.read(|ws| ws.root.clone()).await;

    if global.dry_run {
        let preview = engine.preview_plan(&plan).await?;
        let verdict = engine.validate_plan(&plan, &options).await;
        output::dry_run(&plan, &preview, verdict.as_ref().err(), &root, global.json)?;
        return Ok(match verdict {
            Ok(()) => 0,
            Err(err) => output::exit_code(&err),
        });
    }

    let result = engine.execute_plan(&plan, options).await?;
    output::executed(&result, &root, global.json)?;
    Ok(0)
}
