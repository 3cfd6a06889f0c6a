//! superset-admin CLI
//!
//! Drives the list controllers against a live server:
//!
//! - `databases [search]`
//! - `schemas <database_id> [--force] [--tables <schema>]`
//! - `list <dashboards|charts|datasets> [--page N] [--size N] [--sort col] [--asc] [--filter col:opr:value]`
//! - `favorite <dashboard|chart> <id> on|off`
//! - `import <dashboard|dataset> <path> [--overwrite]`
//!
//! Connection settings come from the environment (or `.env`), see `Settings`.

use anyhow::{anyhow, bail, Context};
use std::env;
use std::sync::Arc;
use superset_admin::controller::ListController;
use superset_admin::favorites::FavoriteTracker;
use superset_admin::fetcher::FetchOutcome;
use superset_admin::import::{ImportFile, ImportModal};
use superset_admin::models::{
    Chart, Dashboard, Dataset, FilterValue, PageRequest, Resource, ResourceKind, SortColumn,
};
use superset_admin::notify::{Notifier, Toast, ToastLevel};
use superset_admin::selector::{DatabaseSchemaSelector, SelectorEvent, SelectorOptions};
use superset_admin::{Settings, SupersetClient};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "\
Usage: superset-admin <command> [options]

Commands:
  databases [search]                               List visible databases
  schemas <database_id> [--force] [--tables <schema>]
                                                   List schemas (and tables) of a database
  list <kind> [--page N] [--size N] [--sort col] [--asc] [--filter col:opr:value]
                                                   List dashboards, charts or datasets
  favorite <dashboard|chart> <id> on|off           Mark or unmark a favorite
  import <dashboard|dataset> <path> [--overwrite]  Upload an export bundle";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let settings = Settings::load()?;
    info!("Using server {}", settings.api.base_url);

    let client = Arc::new(SupersetClient::new(&settings.api)?);
    match (&settings.api.username, &settings.api.password) {
        (Some(username), Some(password)) => {
            client
                .login(username, password, &settings.api.auth_provider)
                .await
                .context("Login failed")?;
        }
        _ => warn!("SUPERSET_USERNAME not set, continuing without a session"),
    }

    let (notifier, mut toasts) = Notifier::channel();
    let rest = &args[1..];

    let result = match command.as_str() {
        "databases" => databases(client, rest).await,
        "schemas" => schemas(client, rest).await,
        "list" => list(client, &settings, notifier, rest).await,
        "favorite" => favorite(client, notifier, rest).await,
        "import" => import(client, &settings, notifier, rest).await,
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    };

    print_toasts(&mut toasts);
    result
}

/// Initialize tracing with structured logging. Logs go to stderr so command
/// output stays clean; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,superset_admin=info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact()
        }))
        .init();
}

fn print_toasts(toasts: &mut UnboundedReceiver<Toast>) {
    while let Ok(toast) = toasts.try_recv() {
        let tag = match toast.level {
            ToastLevel::Success => "ok",
            ToastLevel::Info => "info",
            ToastLevel::Warning => "warning",
            ToastLevel::Danger => "error",
        };
        eprintln!("[{}] {}", tag, toast.message);
    }
}

fn print_events(events: &mut UnboundedReceiver<SelectorEvent>) -> anyhow::Result<()> {
    let mut failure = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SelectorEvent::AccessDenied(message) | SelectorEvent::Error(message) => {
                eprintln!("[error] {}", message);
                failure = Some(message);
            }
            other => tracing::debug!("selector: {:?}", other),
        }
    }
    match failure {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}

fn parse_kind(raw: Option<&String>) -> anyhow::Result<ResourceKind> {
    let raw = raw.ok_or_else(|| anyhow!("Missing resource kind\n\n{}", USAGE))?;
    ResourceKind::parse(raw).ok_or_else(|| anyhow!("Unknown resource kind: {}", raw))
}

fn parse_id(raw: Option<&String>, what: &str) -> anyhow::Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("Missing {}\n\n{}", what, USAGE))?;
    raw.parse().with_context(|| format!("Invalid {}: {}", what, raw))
}

async fn databases(client: Arc<SupersetClient>, args: &[String]) -> anyhow::Result<()> {
    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let selector = DatabaseSchemaSelector::new(client, SelectorOptions::default(), tx);

    selector.load_databases(args.first().map(String::as_str)).await;
    print_events(&mut events)?;

    for db in selector.state().await.database_options {
        println!("{:>5}  {}", db.id, db.label());
    }
    Ok(())
}

async fn schemas(client: Arc<SupersetClient>, args: &[String]) -> anyhow::Result<()> {
    let database_id = parse_id(args.first(), "database id")?;
    let mut force = false;
    let mut tables_of: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--force" => force = true,
            "--tables" => {
                i += 1;
                tables_of = args.get(i).cloned();
            }
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }

    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let selector = DatabaseSchemaSelector::new(
        client,
        SelectorOptions {
            sql_lab_only: false,
            load_tables: tables_of.is_some(),
        },
        tx,
    );

    selector.load_databases(None).await;
    let database = selector
        .state()
        .await
        .database_options
        .into_iter()
        .find(|db| db.id == database_id);
    let Some(database) = database else {
        print_events(&mut events)?;
        bail!("No database with id {}", database_id);
    };

    selector.change_database(Some(database), force).await;
    if let Some(schema) = tables_of {
        selector.change_schema(Some(schema), force).await;
    }
    print_events(&mut events)?;

    let state = selector.state().await;
    if state.schema.is_some() {
        for table in state.table_options {
            let kind = if table.is_view() { "view" } else { "table" };
            println!("{:<6} {}", kind, table.value);
        }
    } else {
        for schema in state.schema_options {
            println!("{}", schema);
        }
    }
    Ok(())
}

async fn list(
    client: Arc<SupersetClient>,
    settings: &Settings,
    notifier: Notifier,
    args: &[String],
) -> anyhow::Result<()> {
    match parse_kind(args.first())? {
        ResourceKind::Dashboard => list_kind::<Dashboard>(client, settings, notifier, &args[1..]).await,
        ResourceKind::Chart => list_kind::<Chart>(client, settings, notifier, &args[1..]).await,
        ResourceKind::Dataset => list_kind::<Dataset>(client, settings, notifier, &args[1..]).await,
    }
}

async fn list_kind<R: Resource>(
    client: Arc<SupersetClient>,
    settings: &Settings,
    notifier: Notifier,
    args: &[String],
) -> anyhow::Result<()> {
    let controller = ListController::<R>::new(client, settings, notifier);
    let request = parse_list_options(controller.initial_request(), args)?;

    if controller.fetch_data(request).await != FetchOutcome::Applied {
        bail!("Could not load {}s", R::KIND);
    }

    let page = controller.fetcher().page().await;
    for card in controller.cards().await {
        let star = match card.favorite {
            Some(true) => "*",
            _ => " ",
        };
        println!("{:>6} {} {}", card.id, star, card.name);
    }
    println!(
        "-- {} {}s, page {} of {}",
        page.count,
        R::KIND,
        page.last_request.as_ref().map(|r| r.page_index + 1).unwrap_or(1),
        page.page_count().max(1)
    );
    Ok(())
}

/// Apply `list` options to the initial request. `--asc` holds for the final
/// sort column wherever it appears on the command line.
fn parse_list_options(mut request: PageRequest, args: &[String]) -> anyhow::Result<PageRequest> {
    let mut ascending = false;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--page" => {
                request.page_index = parse_id(value, "page")?.try_into()?;
                i += 1;
            }
            "--size" => {
                request.page_size = parse_id(value, "page size")?.try_into()?;
                i += 1;
            }
            "--sort" => {
                let column = value.ok_or_else(|| anyhow!("Missing sort column"))?;
                request.sort_by = vec![SortColumn::desc(column.as_str())];
                i += 1;
            }
            "--asc" => ascending = true,
            "--filter" => {
                let raw = value.ok_or_else(|| anyhow!("Missing filter"))?;
                let mut parts = raw.splitn(3, ':');
                let (Some(col), Some(opr), Some(val)) = (parts.next(), parts.next(), parts.next()) else {
                    bail!("Filters look like col:opr:value, got {}", raw);
                };
                request = request.with_filter(FilterValue::new(col, opr, val));
                i += 1;
            }
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }

    if ascending {
        for sort in &mut request.sort_by {
            sort.desc = false;
        }
    }
    Ok(request)
}

async fn favorite(client: Arc<SupersetClient>, notifier: Notifier, args: &[String]) -> anyhow::Result<()> {
    let kind = parse_kind(args.first())?;
    if !kind.has_favorites() {
        bail!("{}s cannot be favorited", kind);
    }
    let id = parse_id(args.get(1), "id")?;
    let on = match args.get(2).map(String::as_str) {
        Some("on") => true,
        Some("off") => false,
        _ => bail!("Expected on or off\n\n{}", USAGE),
    };

    let tracker = FavoriteTracker::new(client, kind, notifier);
    match tracker.save_favorite_status(id, on).await {
        FetchOutcome::Applied => {
            println!("{} {} {}", kind.title(), id, if on { "favorited" } else { "unfavorited" });
            Ok(())
        }
        _ => bail!("Could not update favorite status"),
    }
}

async fn import(
    client: Arc<SupersetClient>,
    settings: &Settings,
    notifier: Notifier,
    args: &[String],
) -> anyhow::Result<()> {
    let kind = parse_kind(args.first())?;
    let path = args.get(1).ok_or_else(|| anyhow!("Missing bundle path\n\n{}", USAGE))?;
    let overwrite = args[2..].iter().any(|a| a == "--overwrite");

    let modal = ImportModal::<()>::new(client, kind, &settings.features, notifier, |_| {})?;
    modal.select_file(ImportFile::from_path(path).await?).await;
    modal.set_overwrite(overwrite).await;

    if let Err(e) = modal.submit().await {
        let message = modal.error().await.unwrap_or_else(|| e.to_string());
        bail!("Import failed: {}", message);
    }
    Ok(())
}
