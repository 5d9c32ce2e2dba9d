#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::Arg;
use clap::ArgGroup;
use clap::Command;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::config::ConfigKey;
use crate::domain::models::Session;
use crate::domain::models::SessionStore;
use crate::infrastructure::stores::FilesystemStore;

fn format_session(session: &Session) -> String {
    let mut res = format!(
        "- (ID: {}) {}, Model: {}",
        session.id, session.last_activity, session.model,
    );

    if !session.messages.is_empty() {
        let mut line = session.messages[0].text.split('\n').collect::<Vec<_>>()[0].to_string();

        // Truncate on a char boundary; byte slicing panics on multibyte
        // text.
        if line.chars().count() >= 70 {
            line = format!("{}...", line.chars().take(67).collect::<String>());
        }
        res = format!("{res}, {line}");
    }

    return res;
}

async fn print_sessions_list() -> Result<()> {
    let mut sessions = FilesystemStore::default()
        .list()
        .await?
        .iter()
        .map(|session| {
            return format_session(session);
        })
        .collect::<Vec<String>>();

    sessions.reverse();

    if sessions.is_empty() {
        println!("There are no sessions available. You should start your first one!");
    } else {
        println!("{}", sessions.join("\n"));
    }

    return Ok(());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if !config_file_path.parent().unwrap().exists() {
        fs::create_dir_all(config_file_path.parent().unwrap()).await?;
    }

    let mut file = fs::File::create(config_file_path.clone()).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    let config_path_display = config_file_path.as_os_str().to_str().unwrap();
    println!("Created default config file at {config_path_display}");
    return Ok(());
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_sessions_delete() -> Command {
    return Command::new("delete")
        .about("Delete a session.")
        .arg(
            clap::Arg::new("session-id")
                .short('i')
                .long("id")
                .help("Session ID")
                .num_args(1),
        )
        .group(ArgGroup::new("delete-args").args(["session-id"]).required(true));
}

fn arg_backend() -> Arg {
    return Arg::new(ConfigKey::Backend.to_string())
        .short('b')
        .long(ConfigKey::Backend.to_string())
        .env("CARELINE_BACKEND")
        .num_args(1)
        .help(format!(
            "The backend hosting a model to connect to. [default: {}]",
            Config::default(ConfigKey::Backend)
        ))
        .value_parser(PossibleValuesParser::new(["ollama"]));
}

fn arg_backend_health_check_timeout() -> Arg {
    return Arg::new(ConfigKey::BackendHealthCheckTimeout.to_string())
        .long(ConfigKey::BackendHealthCheckTimeout.to_string())
        .env("CARELINE_BACKEND_HEALTH_CHECK_TIMEOUT")
        .num_args(1)
        .help(
            format!("Time to wait in milliseconds before timing out when doing a healthcheck for a backend. [default: {}]", Config::default(ConfigKey::BackendHealthCheckTimeout)),
        );
}

fn arg_model() -> Arg {
    return Arg::new(ConfigKey::Model.to_string())
        .short('m')
        .long(ConfigKey::Model.to_string())
        .env("CARELINE_MODEL")
        .num_args(1)
        .help("The model on the backend to generate with. Defaults to the first model available from the backend if not set.");
}

fn arg_username() -> Arg {
    return Arg::new(ConfigKey::Username.to_string())
        .short('u')
        .long(ConfigKey::Username.to_string())
        .env("CARELINE_USERNAME")
        .num_args(1)
        .help("The session-owner name used when running interactively.");
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Start a new chat session.")
        .arg(arg_backend())
        .arg(arg_backend_health_check_timeout())
        .arg(arg_model())
        .arg(arg_username());
}

fn subcommand_sessions() -> Command {
    return Command::new("sessions")
        .about("Manage past chat sessions.")
        .arg_required_else_help(true)
        .subcommand(Command::new("dir").about("Print the sessions data directory path."))
        .subcommand(
            Command::new("list").about("List all previous sessions with their ids and models."),
        )
        .subcommand(
            Command::new("open")
                .about("Open a previous session by ID.")
                .arg(
                    clap::Arg::new(ConfigKey::SessionID.to_string())
                        .short('i')
                        .long("id")
                        .help("Session ID")
                        .required(true),
                ),
        )
        .subcommand(subcommand_sessions_delete());
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("careline")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_config())
        .subcommand(subcommand_sessions())
        .arg(arg_backend())
        .arg(arg_backend_health_check_timeout())
        .arg(arg_model())
        .arg(arg_username())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("CARELINE_CONFIG_FILE")
                .num_args(1)
                .help(format!(
                    "Path to configuration file [default: {}]",
                    Config::default(ConfigKey::ConfigFile)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::OllamaURL.to_string())
                .long(ConfigKey::OllamaURL.to_string())
                .env("CARELINE_OLLAMA_URL")
                .num_args(1)
                .help(format!(
                    "Ollama API URL when using the Ollama backend. [default: {}]",
                    Config::default(ConfigKey::OllamaURL)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ContextBudget.to_string())
                .long(ConfigKey::ContextBudget.to_string())
                .env("CARELINE_CONTEXT_BUDGET")
                .num_args(1)
                .help(format!(
                    "Maximum prompt size in characters sent to the model. [default: {}]",
                    Config::default(ConfigKey::ContextBudget)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GenerationDeadline.to_string())
                .long(ConfigKey::GenerationDeadline.to_string())
                .env("CARELINE_GENERATION_DEADLINE")
                .num_args(1)
                .help(format!(
                    "Overall generation deadline in milliseconds. [default: {}]",
                    Config::default(ConfigKey::GenerationDeadline)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ChunkIdleTimeout.to_string())
                .long(ConfigKey::ChunkIdleTimeout.to_string())
                .env("CARELINE_CHUNK_IDLE_TIMEOUT")
                .num_args(1)
                .help(format!(
                    "Time in milliseconds to wait for the next streamed chunk before timing out. [default: {}]",
                    Config::default(ConfigKey::ChunkIdleTimeout)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::CacheTtl.to_string())
                .long(ConfigKey::CacheTtl.to_string())
                .env("CARELINE_CACHE_TTL")
                .num_args(1)
                .help(format!(
                    "Time in seconds a cached completion stays valid. [default: {}]",
                    Config::default(ConfigKey::CacheTtl)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::CacheCapacity.to_string())
                .long(ConfigKey::CacheCapacity.to_string())
                .env("CARELINE_CACHE_CAPACITY")
                .num_args(1)
                .help(format!(
                    "Maximum number of completions held in the response cache. [default: {}]",
                    Config::default(ConfigKey::CacheCapacity)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GlobalConcurrency.to_string())
                .long(ConfigKey::GlobalConcurrency.to_string())
                .env("CARELINE_GLOBAL_CONCURRENCY")
                .num_args(1)
                .help(format!(
                    "Maximum number of generations running at once across all sessions. [default: {}]",
                    Config::default(ConfigKey::GlobalConcurrency)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::StreamBufferSize.to_string())
                .long(ConfigKey::StreamBufferSize.to_string())
                .env("CARELINE_STREAM_BUFFER_SIZE")
                .num_args(1)
                .help(format!(
                    "Size of the bounded channel buffering streamed chunks. [default: {}]",
                    Config::default(ConfigKey::StreamBufferSize)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SessionIdleTimeout.to_string())
                .long(ConfigKey::SessionIdleTimeout.to_string())
                .env("CARELINE_SESSION_IDLE_TIMEOUT")
                .num_args(1)
                .help(format!(
                    "Time in seconds before an idle session is evicted from memory. [default: {}]",
                    Config::default(ConfigKey::SessionIdleTimeout)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::RetryAttempts.to_string())
                .long(ConfigKey::RetryAttempts.to_string())
                .env("CARELINE_RETRY_ATTEMPTS")
                .num_args(1)
                .help(format!(
                    "Number of connect retries before a backend is reported unavailable. [default: {}]",
                    Config::default(ConfigKey::RetryAttempts)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::RetryBaseDelay.to_string())
                .long(ConfigKey::RetryBaseDelay.to_string())
                .env("CARELINE_RETRY_BASE_DELAY")
                .num_args(1)
                .help(format!(
                    "Base delay in milliseconds between connect retries, doubled per attempt. [default: {}]",
                    Config::default(ConfigKey::RetryBaseDelay)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::Temperature.to_string())
                .long(ConfigKey::Temperature.to_string())
                .env("CARELINE_TEMPERATURE")
                .num_args(1)
                .help(format!(
                    "Sampling temperature passed to the model. [default: {}]",
                    Config::default(ConfigKey::Temperature)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::MaxTokens.to_string())
                .long(ConfigKey::MaxTokens.to_string())
                .env("CARELINE_MAX_TOKENS")
                .num_args(1)
                .help(format!(
                    "Maximum number of tokens the model may generate per exchange. [default: {}]",
                    Config::default(ConfigKey::MaxTokens)
                ))
                .global(true),
        );
}

pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("sessions", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("dir", _)) => {
                let dir = FilesystemStore::default()
                    .data_dir
                    .to_string_lossy()
                    .to_string();
                println!("{dir}");
                return Ok(false);
            }
            Some(("list", _)) => {
                print_sessions_list().await?;
                return Ok(false);
            }
            Some(("open", open_matches)) => {
                Config::load(build(), vec![&matches, open_matches]).await?;
                if let Some(session_id) = open_matches.get_one::<String>("session-id") {
                    let session = FilesystemStore::default().load(session_id).await?;
                    Config::set(ConfigKey::Model, &session.model);
                    Config::set(ConfigKey::SessionID, session_id);
                }
            }
            Some(("delete", delete_matches)) => {
                if let Some(session_id) = delete_matches.get_one::<String>("session-id") {
                    FilesystemStore::default().delete(session_id).await?;
                    println!("Deleted session {session_id}");
                } else {
                    subcommand_sessions_delete().print_long_help()?;
                }
                return Ok(false);
            }
            _ => {
                subcommand_sessions().print_long_help()?;
                return Ok(false);
            }
        },
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}
