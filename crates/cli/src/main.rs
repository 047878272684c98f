use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qinglong-bot")]
#[command(about = "DingTalk robot for managing QingLong environment variables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a template config.json.
    Init {
        /// Config file path (default: QLBOT_CONFIG_PATH or ~/.qinglong-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway: health probe plus the DingTalk stream relay endpoint.
    Serve {
        /// Config file path (default: QLBOT_CONFIG_PATH or ~/.qinglong-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the names of all QingLong environment variables.
    List {
        /// Config file path (default: QLBOT_CONFIG_PATH or ~/.qinglong-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Set the value of an existing QingLong environment variable.
    Update {
        /// Config file path (default: QLBOT_CONFIG_PATH or ~/.qinglong-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Variable name (exact match)
        key: String,

        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("qinglong-bot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::List { config }) => {
            if let Err(e) = run_list(config).await {
                log::error!("list failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Update { config, key, value }) => {
            if let Err(e) = run_update(config, &key, &value).await {
                log::error!("update failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config).await
}

fn qinglong_client(
    config_path: Option<std::path::PathBuf>,
) -> anyhow::Result<lib::qinglong::QingLongClient> {
    let (config, _) = lib::config::load_config(config_path)?;
    let credentials = lib::config::resolve_qinglong_credentials(&config)?;
    Ok(lib::qinglong::QingLongClient::new(credentials))
}

async fn run_list(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let client = qinglong_client(config_path)?;
    for name in client.list_environment_variable_names().await? {
        println!("{}", name);
    }
    Ok(())
}

async fn run_update(
    config_path: Option<std::path::PathBuf>,
    key: &str,
    value: &str,
) -> anyhow::Result<()> {
    let client = qinglong_client(config_path)?;
    client.update_environment_variable(key, value).await?;
    println!("updated {}", key);
    Ok(())
}
