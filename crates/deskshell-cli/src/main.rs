use clap::{Parser, Subcommand};
use deskshell_bridge::{logger, BridgeConfig, CommandError, Session, UiPrefs};
use deskshell_proto::{ConfigChanged, CreateUserCmd, HttpRequest, LogLevel};
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "deskshell-cli", version, about = "deskshell backend shell")]
struct Cli {
    /// Backend address
    #[arg(long, global = true, default_value_t = deskshell_util::backend_addr())]
    addr: String,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Local UI preferences (not sent to the backend)
    Prefs {
        #[command(subcommand)]
        cmd: PrefsCmd,
    },
    #[command(flatten)]
    Backend(BackendCmd),
}

#[derive(Subcommand)]
enum BackendCmd {
    /// User management
    Users {
        #[command(subcommand)]
        cmd: UsersCmd,
    },
    /// Application settings stored by the backend
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
    /// Print config:changed events until Ctrl-C
    Watch,
    /// Send one log record to the backend
    Log {
        level: LogLevel,
        message: String,
        /// Extra structured field, key=value (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Check backend storage
    Health,
    /// Open the log folder on the backend host
    OpenLogs,
    Greet {
        name: String,
    },
    /// Perform an HTTP request from the backend host
    Http {
        method: String,
        url: String,
        #[arg(long = "header", value_parser = parse_field)]
        headers: Vec<(String, String)>,
        #[arg(long = "query", value_parser = parse_field)]
        query: Vec<(String, String)>,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[derive(Subcommand)]
enum UsersCmd {
    List,
    Create {
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum SettingsCmd {
    List,
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum PrefsCmd {
    Show,
    Sidebar {
        #[arg(action = clap::ArgAction::Set)]
        collapsed: bool,
    },
    Language { language: String },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let message = match err.downcast_ref::<CommandError>() {
            Some(err) => err.message(),
            None => err.to_string(),
        };
        eprintln!("error: {message}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.cmd {
        Cmd::Prefs { cmd } => prefs(cmd),
        Cmd::Backend(cmd) => {
            let config = BridgeConfig::from_env()
                .with_addr(cli.addr)
                .with_log_target("deskshell-cli");
            backend(Session::connect(&config).await?, cmd).await
        }
    }
}

async fn backend(session: Session, cmd: BackendCmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        BackendCmd::Users { cmd } => match cmd {
            UsersCmd::List => {
                for user in session.users.list().await?.iter() {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        user.id,
                        user.username,
                        user.email.as_deref().unwrap_or("-"),
                        user.role,
                        user.created_at
                    );
                }
            }
            UsersCmd::Create {
                username,
                email,
                role,
            } => {
                let user = session
                    .users
                    .create(CreateUserCmd::new(username, &email, role))
                    .await?;
                println!("created {} ({})", user.username, user.id);
            }
            UsersCmd::Delete { id } => {
                session.users.delete(&id).await?;
                println!("deleted {id}");
            }
        },
        BackendCmd::Settings { cmd } => match cmd {
            SettingsCmd::List => {
                for (key, value) in session.settings.all().await?.iter() {
                    println!("{key}={value}");
                }
            }
            SettingsCmd::Get { key } => match session.settings.fetch_one(&key).await? {
                Some(value) => println!("{value}"),
                None => println!("{key} is not set"),
            },
            SettingsCmd::Set { key, value } => {
                session.settings.update(&key, &value).await?;
                println!("{key}={value}");
            }
        },
        BackendCmd::Watch => {
            let subscription = session
                .events
                .subscribe::<ConfigChanged, _>(|change| println!("{}={}", change.key, change.value));
            if !subscription.ready().await {
                return Err("could not subscribe to config:changed".into());
            }
            println!("watching config:changed, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            subscription.dispose().await;
        }
        BackendCmd::Log {
            level,
            message,
            fields,
        } => {
            let fields = (!fields.is_empty()).then(|| {
                Value::Object(
                    fields
                        .into_iter()
                        .map(|(key, value)| (key, Value::String(value)))
                        .collect::<Map<_, _>>(),
                )
            });
            let Some(logger) = logger::global() else {
                return Err("remote logger is not installed".into());
            };
            logger.log(level, message, fields);
            logger.flush().await;
        }
        BackendCmd::Health => println!("{}", session.system.check_db_health().await?),
        BackendCmd::OpenLogs => session.system.open_log_folder().await?,
        BackendCmd::Greet { name } => println!("{}", session.system.greet(&name).await?),
        BackendCmd::Http {
            method,
            url,
            headers,
            query,
            body,
        } => {
            let body = body.map(|raw| serde_json::from_str(&raw)).transpose()?;
            let request = HttpRequest {
                method,
                url,
                headers: (!headers.is_empty()).then(|| headers.into_iter().collect()),
                body,
                query: (!query.is_empty()).then(|| query.into_iter().collect()),
            };
            let response = session.system.http_request(request).await?;
            println!("{}", response.status);
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
    }
    Ok(())
}

fn prefs(cmd: PrefsCmd) -> Result<(), Box<dyn std::error::Error>> {
    let mut prefs = UiPrefs::load();
    match cmd {
        PrefsCmd::Show => {}
        PrefsCmd::Sidebar { collapsed } => {
            prefs.sidebar_collapsed = collapsed;
            prefs.save()?;
        }
        PrefsCmd::Language { language } => {
            if !prefs.set_language(&language) {
                return Err(format!(
                    "unsupported language {language}, expected one of {}",
                    deskshell_bridge::prefs::SUPPORTED_LANGUAGES.join(", ")
                )
                .into());
            }
            prefs.save()?;
        }
    }
    println!("sidebar_collapsed={}", prefs.sidebar_collapsed);
    println!("language={}", prefs.language);
    Ok(())
}
