use kiln::agent_loop::{Conversation, SessionState};
use kiln::config::Config;
use kiln::dispatch::Dispatcher;
use kiln::init;
use kiln::llm::ResponsesClient;
use kiln::repl::{Repl, Transcript};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Kiln - an LLM agent confined to one working directory", long_about = None)]
struct Cli {
    /// Configuration file (default: ./kiln.yml, $KILN_CONFIG, or the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory the agent is confined to
    #[arg(short = 'w', long)]
    working_dir: Option<PathBuf>,

    /// Allow shell, script and run functions from the start of the session
    #[arg(long)]
    allow_unsafe: bool,

    /// Print every function call
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=kiln=debug for spawn and request details
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    // 1. Load configuration, environment wins over the file, flags win over both
    let config_path = init::resolve_config_path(args.config);
    let mut config = Config::load_or_default(config_path.as_deref())?;
    config.apply_process_env()?;
    if let Some(dir) = args.working_dir {
        config.runtime.working_directory = dir;
    }
    config.runtime.allow_unsafe |= args.allow_unsafe;
    config.runtime.verbose |= args.verbose;
    config.validate()?;

    // 2. Foundations
    init::initialize_working_directory(&config.runtime.working_directory)?;
    let system_prompt = init::load_system_prompt(&config.runtime.system_prompt)?;
    let transcript = Transcript::open(&config.runtime.history_file)
        .context("Chat history is not writable")?;

    // 3. Core and driver
    let dispatcher = Dispatcher::from_config(&config);
    let client = ResponsesClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    );
    let session = SessionState {
        working_directory: config.runtime.working_directory.clone(),
        allow_unsafe: config.runtime.allow_unsafe,
        verbose: config.runtime.verbose,
        use_functions: config.runtime.use_functions,
        max_turns: config.runtime.max_turns,
    };

    tracing::info!(
        model = client.model(),
        working_directory = %session.working_directory.display(),
        allow_unsafe = session.allow_unsafe,
        "session starting"
    );
    println!(
        "Kiln ready. Model: {}. Working directory: {}",
        client.model(),
        session.working_directory.display()
    );
    println!("Type /help for commands.");

    let mut repl = Repl::new(
        client,
        dispatcher,
        Conversation::new(&system_prompt),
        session,
        transcript,
    );
    repl.run().await
}
