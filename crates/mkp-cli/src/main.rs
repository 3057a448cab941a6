use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mkp")]
#[command(about = "Marketplace ledger operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> environment overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate a layered config and report which secret env vars resolve
    ConfigCheck {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Admin credential utilities
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },

    /// Game catalog maintenance
    Game {
        #[command(subcommand)]
        cmd: GameCmd,
    },

    /// Ledger consistency checks
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum AdminCmd {
    /// Print the stored form of an admin password for the admin hash env var.
    HashPassword {
        #[arg(long)]
        password: String,

        /// Hex salt (at least 8 bytes). Random when omitted.
        #[arg(long)]
        salt: Option<String>,

        /// PBKDF2 work factor.
        #[arg(long, default_value_t = mkp_config::admin::DEFAULT_ROUNDS)]
        rounds: u32,
    },
}

#[derive(Subcommand)]
enum GameCmd {
    /// Add a game to the catalog
    Add {
        #[arg(long)]
        name: String,

        #[arg(long = "icon-url")]
        icon_url: Option<String>,
    },

    /// List the catalog
    List,
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Compare an account's stored balance with its sale/withdrawal history.
    /// Exits non-zero on mismatch.
    Check {
        #[arg(long)]
        account_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = mkp_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = mkp_db::status(&pool).await?;
                    println!("db_ok={} has_ledger_schema={}", s.ok, s.has_ledger_schema);
                }
                DbCmd::Migrate => {
                    mkp_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = mkp_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck { paths } => commands::config_check(&paths)?,

        Commands::Admin { cmd } => match cmd {
            AdminCmd::HashPassword {
                password,
                salt,
                rounds,
            } => {
                let stored = commands::admin::hash_password(&password, salt.as_deref(), rounds)?;
                println!("admin_password_hash={stored}");
            }
        },

        Commands::Game { cmd } => {
            let pool = mkp_db::connect_from_env().await?;
            match cmd {
                GameCmd::Add { name, icon_url } => {
                    commands::catalog::game_add(&pool, &name, icon_url.as_deref()).await?
                }
                GameCmd::List => commands::catalog::game_list(&pool).await?,
            }
        }

        Commands::Ledger { cmd } => match cmd {
            LedgerCmd::Check { account_id } => {
                let pool = mkp_db::connect_from_env().await?;
                commands::ledger::check(&pool, account_id).await?;
            }
        },
    }

    Ok(())
}
