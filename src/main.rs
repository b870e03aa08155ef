use cashflow_overlay::api::{DataApi, HttpDataApi, LocalFmrApi};
use cashflow_overlay::auth::{AuthBoundary, SessionAuth};
use cashflow_overlay::cache::AreaParams;
use cashflow_overlay::config::OverlayConfig;
use cashflow_overlay::db::PrefsStore;
use cashflow_overlay::dom::Document;
use cashflow_overlay::errors::OverlayError;
use cashflow_overlay::extractor::Site;
use cashflow_overlay::overlay::{Overlay, OverlayDeps};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

/// Upper bound on waiting for in-flight lookups before writing the page.
const SETTLE_LIMIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "cashflow-overlay")]
#[command(about = "Annotate saved listing pages with rental cash-flow badges")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass over a saved listing page and write the annotated HTML
    Annotate {
        /// zillow, redfin or realtor
        #[arg(long)]
        site: String,

        /// Saved HTML page
        #[arg(long)]
        page: PathBuf,

        /// Read reference rents from a HUD Small Area FMR CSV instead of the API
        #[arg(long)]
        fmr_csv: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Preferences database (defaults to CASHFLOW_PREFS_PATH)
        #[arg(long)]
        prefs: Option<String>,

        /// Start a session before annotating
        #[arg(long)]
        login: bool,
    },

    /// Inspect or change stored preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,

        /// Preferences database (defaults to CASHFLOW_PREFS_PATH)
        #[arg(long, global = true)]
        db: Option<String>,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Store a JSON value, e.g. `prefs set display_mode '"rent"'`
    Set { key: String, value: String },
    /// Print every stored preference
    Show,
}

fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Could not start runtime: {e}");
            std::process::exit(1);
        }
    };

    let local = LocalSet::new();
    if let Err(e) = local.block_on(&runtime, run(cli)) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), OverlayError> {
    let config = OverlayConfig::from_env()?;

    match cli.command {
        Commands::Annotate {
            site,
            page,
            fmr_csv,
            out,
            prefs,
            login,
        } => annotate(config, &site, page, fmr_csv, out, prefs, login).await,
        Commands::Prefs { action, db } => {
            let store = PrefsStore::open(db.unwrap_or(config.prefs_path))?;
            match action {
                PrefsAction::Set { key, value } => {
                    let value: serde_json::Value = serde_json::from_str(&value)?;
                    if store.set(&key, &value).await? {
                        println!("{key} = {value}");
                    } else {
                        println!("{key} unchanged");
                    }
                }
                PrefsAction::Show => {
                    for (key, value) in store.entries().await? {
                        println!("{key} = {value}");
                    }
                }
            }
            Ok(())
        }
    }
}

async fn annotate(
    config: OverlayConfig,
    site: &str,
    page: PathBuf,
    fmr_csv: Option<PathBuf>,
    out: Option<PathBuf>,
    prefs: Option<String>,
    login: bool,
) -> Result<(), OverlayError> {
    let site = Site::parse(site)
        .ok_or_else(|| OverlayError::Config(format!("unsupported site `{site}`")))?;

    let store = Rc::new(PrefsStore::open(
        prefs.unwrap_or_else(|| config.prefs_path.clone()),
    )?);
    let session = Rc::new(SessionAuth::new(store.clone()));
    if login {
        session.login().await?;
    }
    let auth: Rc<dyn AuthBoundary> = session;

    let api: Rc<dyn DataApi> = match fmr_csv {
        Some(path) => {
            let area = AreaParams {
                tax_rate_annual_pct: config.default_tax_rate_pct,
                mortgage_rate_annual_pct: config.default_mortgage_rate_pct,
            };
            Rc::new(LocalFmrApi::from_path(&path, area)?)
        }
        None => Rc::new(HttpDataApi::new(&config.api_base, Some(auth.clone()))?),
    };

    let markup = std::fs::read_to_string(&page)?;
    let overlay = Overlay::new(
        Document::parse(&markup),
        site,
        config,
        OverlayDeps {
            api,
            auth,
            prefs: Some(store),
        },
    )
    .await?;

    let stats = overlay.reconcile();
    info!("{site} pass over {}: {stats}", page.display());
    if !overlay.settle(SETTLE_LIMIT).await {
        warn!("some badges were still loading after {SETTLE_LIMIT:?}");
    }

    let html = overlay.html();
    match out {
        Some(path) => {
            std::fs::write(&path, html)?;
            println!("✅ Wrote {}", path.display());
        }
        None => println!("{html}"),
    }
    Ok(())
}
