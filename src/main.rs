mod app;
mod cache;
mod commands;
mod config;
mod event;
mod gateway;
mod logging;
mod query;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use cache::{state_keys, CacheStorage, MemoryStorage, SqliteStorage};
use gateway::{Gateway, HttpNetwork, Method, Request, Rules};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline caching gateway for the notes web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin the app is served from, e.g. https://notes.example.com
  #[arg(long, global = true)]
  origin: Option<String>,

  /// Cache database path
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Keep the cache in memory for this run only
  #[arg(long, global = true)]
  memory: bool,

  /// Print reports as JSON
  #[arg(long, global = true)]
  json: bool,

  /// Debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: CommandArg,
}

#[derive(Subcommand, Debug)]
enum CommandArg {
  /// Populate the current version's store from the manifests
  Install,
  /// Take control and delete stores of other versions
  Activate,
  /// Install, then activate immediately
  Up,
  /// Send one request through the gateway
  Fetch {
    url: String,
    /// Treat the request as a full-document navigation
    #[arg(short, long)]
    navigate: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List cache stores
  Stores,
  /// Delete every store and the lifecycle state
  Clear,
  /// Browse stores and entries in a terminal UI
  Browse,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = match args.command {
    CommandArg::Browse => Some(logging::init_file(&config::data_dir()?, args.verbose)?),
    _ => {
      logging::init_stderr(args.verbose)?;
      None
    }
  };

  // Load configuration and apply command-line overrides
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(origin) = args.origin.clone() {
    config.origin = Some(origin);
  }
  if let Some(db) = args.db.clone() {
    config.database = Some(db);
  }

  let storage: Arc<dyn CacheStorage> = if args.memory {
    Arc::new(MemoryStorage::new())
  } else {
    Arc::new(SqliteStorage::open(&config.database_path()?)?)
  };

  match args.command {
    CommandArg::Stores => return list_stores(storage.as_ref(), args.json),
    CommandArg::Clear => {
      storage.clear()?;
      eprintln!("Cache cleared");
      return Ok(());
    }
    CommandArg::Browse => {
      let title = config.origin.clone().unwrap_or_else(|| "(no origin)".to_string());
      let mut app = app::App::new(storage, title, config.version.clone());
      return app.run().await;
    }
    _ => {}
  }

  let rules = Rules::from_config(&config)?;
  let network = Arc::new(HttpNetwork::new(rules.origin.clone(), &config.network)?);
  let gateway = Gateway::new(rules, storage, network)?;

  match args.command {
    CommandArg::Install => {
      let report = gateway.install().await?;
      print_report(&report, args.json, || {
        format!(
          "Installed {}: {} critical, {} secondary cached, {} skipped",
          report.version,
          report.critical_cached,
          report.secondary_cached,
          report.secondary_failed.len()
        )
      })?;
    }
    CommandArg::Activate => {
      let report = gateway.activate().await?;
      print_report(&report, args.json, || {
        format!(
          "Activated {}; purged {} old store(s)",
          report.version,
          report.purged.len()
        )
      })?;
    }
    CommandArg::Up => {
      let install = gateway.install().await?;
      let activate = gateway.activate().await?;
      let both = serde_json::json!({ "install": install, "activate": activate });
      print_report(&both, args.json, || {
        format!(
          "{} is active: {} assets cached, {} old store(s) purged",
          install.version,
          install.critical_cached + install.secondary_cached,
          activate.purged.len()
        )
      })?;
    }
    CommandArg::Fetch {
      url,
      navigate,
      method,
      output,
    } => {
      let parsed = Request::parse(&url)?;
      let request = if navigate {
        Request::navigate(parsed.url)
      } else {
        parsed
      }
      .with_method(Method::parse(&method));

      let served = gateway.fetch(&request).await?;
      // Let background revalidation land before the process exits
      gateway.wait_until_idle().await;

      eprintln!(
        "{} {} [{}] {} bytes {}",
        served.response.status,
        served.source.label(),
        served.response.kind.as_str(),
        served.response.body.len(),
        served.response.content_type().unwrap_or("")
      );

      let mut body = served.response.body.reader();
      match output {
        Some(path) => {
          let mut file = std::fs::File::create(&path)
            .map_err(|e| eyre!("Failed to create {}: {}", path.display(), e))?;
          std::io::copy(&mut body, &mut file)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        }
        None => {
          std::io::copy(&mut body, &mut std::io::stdout().lock())
            .map_err(|e| eyre!("Failed to write body: {}", e))?;
        }
      }
    }
    CommandArg::Stores | CommandArg::Clear | CommandArg::Browse => {}
  }

  tracing::debug!(state = gateway.state().label(), "Done");
  Ok(())
}

fn print_report<T: serde::Serialize>(
  report: &T,
  json: bool,
  summary: impl FnOnce() -> String,
) -> Result<()> {
  if json {
    let out = serde_json::to_string_pretty(report)
      .map_err(|e| eyre!("Failed to serialize report: {}", e))?;
    println!("{}", out);
  } else {
    println!("{}", summary());
  }
  Ok(())
}

fn list_stores(storage: &dyn CacheStorage, json: bool) -> Result<()> {
  let active = storage.get_state(state_keys::ACTIVE_VERSION)?;
  let stores = storage.list_stores()?;

  if json {
    let rows: Vec<_> = stores
      .iter()
      .map(|s| {
        serde_json::json!({
          "name": s.name,
          "created_at": s.created_at,
          "entries": s.entry_count,
          "bytes": s.total_bytes,
          "active": active.as_deref() == Some(s.name.as_str()),
        })
      })
      .collect();
    println!("{}", serde_json::Value::Array(rows));
    return Ok(());
  }

  if stores.is_empty() {
    println!("No cache stores");
    return Ok(());
  }
  for store in stores {
    let marker = if active.as_deref() == Some(store.name.as_str()) {
      "*"
    } else {
      " "
    };
    println!(
      "{} {:<28} {:>5} entries {:>10} bytes  created {}",
      marker,
      store.name,
      store.entry_count,
      store.total_bytes,
      store.created_at.format("%Y-%m-%d %H:%M:%S")
    );
  }
  Ok(())
}
