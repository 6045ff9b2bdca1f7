use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use paletta::config::{Backend, DEFAULT_PROFILE, Settings};
use paletta::errors::{PalettaError, Result};
use paletta::notice::{Notice, Notifier, StderrNotifier, notice_for_error};
use paletta::remote::RemoteBackend;
use paletta::store::local::LocalBackend;
use paletta::store::models::{AddOutcome, CatalogEntry, LineItem, NewLineItem, StoreKind};
use paletta::store::{LineItemBackend, LineItemStore};

/// Presentation-only surcharge shown by `total --vat`.
const VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

#[derive(Parser)]
#[command(
    name = "paletta",
    version,
    about = "Cart and collection for the Paletta footage marketplace"
)]
struct Cli {
    /// Output results as JSON
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Which store to operate on: cart, collection
    #[arg(short, long, global = true, default_value = "cart")]
    store: String,

    /// Browser-style profile the local store is scoped to
    #[arg(short, long, global = true, env = "PALETTA_PROFILE", default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Base URL of the marketplace API; makes every store remote-authoritative
    #[arg(long, global = true, env = "PALETTA_REMOTE_URL")]
    remote: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the items in the store
    List,

    /// Show one item
    Show {
        /// Clip ID
        id: i64,
    },

    /// Add a clip
    Add {
        /// Clip ID
        id: i64,

        /// Clip title
        #[arg(short, long)]
        title: String,

        /// Unit price, e.g. 10.99
        #[arg(long, default_value = "0")]
        price: Decimal,

        /// Thumbnail URL
        #[arg(long)]
        thumbnail: Option<String>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Category name
        #[arg(long)]
        category: Option<String>,

        /// Resolution to purchase, e.g. 4k
        #[arg(short, long)]
        resolution: Option<String>,
    },

    /// Add every clip from a JSON array of catalog entries
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Look a clip up in the remote catalog and add it
    Fetch {
        /// Clip ID
        id: i64,

        /// Resolution to purchase, e.g. 4k
        #[arg(short, long)]
        resolution: Option<String>,
    },

    /// Remove a clip
    Remove {
        /// Clip ID
        id: i64,
    },

    /// Show the store total
    Total {
        /// Include the 20% VAT surcharge
        #[arg(long)]
        vat: bool,
    },

    /// Remove every item
    Clear,

    /// Complete checkout and empty the cart
    Checkout,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<String>,
}

#[derive(Serialize)]
struct TotalResponse {
    entries: usize,
    units: u64,
    total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    vat: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_with_vat: Option<Decimal>,
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        report_failure(&e, json, &StderrNotifier);
        process::exit(1);
    }
}

fn report_failure(error: &PalettaError, json: bool, notifier: &dyn Notifier) {
    if json {
        eprintln!("{}", serde_json::json!({"error": error.to_string()}));
    } else {
        notifier.notify(notice_for_error(error));
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "paletta=warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let kind = StoreKind::parse(&cli.store).ok_or_else(|| {
        PalettaError::InvalidInput(format!(
            "unknown store \"{}\", expected cart or collection",
            cli.store
        ))
    })?;
    let settings = Settings::resolve(&cli.profile, cli.remote.as_deref())?;
    let mut store = LineItemStore::open(kind, open_backend(&settings)?);
    let notifier = StderrNotifier;
    let mut view = StoreView {
        store: &mut store,
        notifier: &notifier,
        json: cli.json,
    };

    match cli.command {
        None | Some(Commands::List) => view.list(),
        Some(Commands::Show { id }) => view.show(id),
        Some(Commands::Add {
            id,
            title,
            price,
            thumbnail,
            tags,
            category,
            resolution,
        }) => {
            let candidate = NewLineItem {
                id,
                title,
                thumbnail_url: thumbnail,
                unit_price: price,
                tags,
                category,
                resolution,
            };
            view.add(candidate)
        }
        Some(Commands::Import { file }) => view.import(&read_catalog_file(&file)?),
        Some(Commands::Fetch { id, resolution }) => {
            let Backend::Remote(url) = &settings.backend else {
                return Err(PalettaError::Config(
                    "fetch needs the marketplace API; pass --remote or set PALETTA_REMOTE_URL"
                        .into(),
                ));
            };
            let entry = RemoteBackend::connect(url.clone())?.catalog_entry(id)?;
            let mut candidate = NewLineItem::from(entry);
            candidate.resolution = resolution;
            view.add(candidate)
        }
        Some(Commands::Remove { id }) => view.remove(id),
        Some(Commands::Total { vat }) => view.total(vat),
        Some(Commands::Clear) => view.clear(),
        Some(Commands::Checkout) => view.checkout(),
    }
}

fn open_backend(settings: &Settings) -> Result<Box<dyn LineItemBackend>> {
    match &settings.backend {
        Backend::Local => {
            std::fs::create_dir_all(&settings.paths.profile_dir)?;
            let conn = Connection::open(&settings.paths.db_path)?;
            Ok(Box::new(LocalBackend::new(conn)?))
        }
        Backend::Remote(url) => Ok(Box::new(RemoteBackend::connect(url.clone())?)),
    }
}

fn read_catalog_file(path: &Path) -> Result<Vec<CatalogEntry>> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| {
        PalettaError::InvalidInput(format!("{} is not a catalog export: {}", path.display(), e))
    })
}

/// Command handlers for one store, given the store by reference.
struct StoreView<'a, B> {
    store: &'a mut LineItemStore<B>,
    notifier: &'a dyn Notifier,
    json: bool,
}

impl<B: LineItemBackend> StoreView<'_, B> {
    fn list(&self) -> Result<()> {
        let snapshot = self.store.list();

        if self.json {
            println!("{}", serde_json::to_string(&snapshot)?);
            return Ok(());
        }

        if snapshot.is_empty() {
            println!("Your {} is empty.", self.store.kind().as_str());
            return Ok(());
        }

        for (pos, item) in snapshot.items.iter().enumerate() {
            print_item_row(pos + 1, item, self.store.kind());
        }
        Ok(())
    }

    fn show(&self, id: i64) -> Result<()> {
        let item = self.store.get(id).ok_or_else(|| {
            let kind = self.store.kind().as_str();
            PalettaError::NotFound(format!("clip #{} is not in your {}", id, kind))
        })?;

        if self.json {
            println!("{}", serde_json::to_string(item)?);
            return Ok(());
        }

        print_item_detail(item);
        Ok(())
    }

    fn add(&mut self, candidate: NewLineItem) -> Result<()> {
        let outcome = self.store.add(candidate)?;
        let message = match &outcome {
            AddOutcome::Added(item) => format!(
                "Added \"{}\" to your {}.",
                item.title,
                self.store.kind().as_str()
            ),
            AddOutcome::Incremented(item) => {
                format!("\"{}\" is now in your cart {} times.", item.title, item.quantity)
            }
        };
        self.report(true, message, None)
    }

    fn import(&mut self, entries: &[CatalogEntry]) -> Result<()> {
        let mut added = 0usize;
        let mut skipped = 0usize;

        for entry in entries {
            match self.store.add(NewLineItem::from(entry.clone())) {
                Ok(_) => added += 1,
                Err(e @ PalettaError::AlreadyExists(_)) => {
                    skipped += 1;
                    if !self.json {
                        self.notifier.notify(notice_for_error(&e));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let message = format!("Imported {} clip(s), skipped {} already present.", added, skipped);
        self.report(true, message, None)
    }

    fn remove(&mut self, id: i64) -> Result<()> {
        let found = self.store.remove(id)?;
        let message = if found {
            format!("Removed clip #{}.", id)
        } else {
            format!("Clip #{} is not in your {}.", id, self.store.kind().as_str())
        };
        self.report(found, message, None)
    }

    fn total(&self, vat: bool) -> Result<()> {
        let summary = self.store.summary();
        let vat_amount = vat.then(|| vat_on(summary.total));

        if self.json {
            let response = TotalResponse {
                entries: summary.entries,
                units: summary.units,
                total: summary.total,
                vat: vat_amount,
                total_with_vat: vat_amount.map(|v| summary.total + v),
            };
            println!("{}", serde_json::to_string(&response)?);
            return Ok(());
        }

        println!("Items:     {} ({} units)", summary.entries, summary.units);
        println!("Subtotal:  {}", format_price(summary.total));
        if let Some(v) = vat_amount {
            println!("VAT (20%): {}", format_price(v));
            println!("Total:     {}", format_price(summary.total + v));
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        let message = format!("Cleared your {}.", self.store.kind().as_str());
        self.report(true, message, None)
    }

    fn checkout(&mut self) -> Result<()> {
        let receipt = self.store.checkout()?;
        let message = format!(
            "Checked out {} item(s) for {}.",
            receipt.items.len(),
            format_price(receipt.total)
        );
        self.report(true, message, receipt.redirect_url)
    }

    fn report(&self, success: bool, message: String, redirect_url: Option<String>) -> Result<()> {
        if self.json {
            let response = StatusResponse {
                success,
                message,
                redirect_url,
            };
            println!("{}", serde_json::to_string(&response)?);
            return Ok(());
        }

        self.notifier.notify(Notice::info(message));
        if let Some(url) = redirect_url {
            println!("Continue at {}", url);
        }
        Ok(())
    }
}

fn vat_on(total: Decimal) -> Decimal {
    (total * VAT_RATE).round_dp(2)
}

fn print_item_row(pos: usize, item: &LineItem, kind: StoreKind) {
    let title = if item.title.chars().count() > 48 {
        format!("{}...", item.title.chars().take(45).collect::<String>())
    } else {
        item.title.clone()
    };

    match kind {
        StoreKind::Cart => println!(
            "{:>3}. #{:<6} {:<48} {:>3} x {:>9} = {:>10}",
            pos,
            item.id,
            title,
            item.quantity,
            format_price(item.unit_price),
            format_price(item.line_total())
        ),
        StoreKind::Collection => {
            let tags = if item.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", item.tags.join(", "))
            };
            println!("{:>3}. #{:<6} {}{}", pos, item.id, title, tags);
        }
    }
}

fn print_item_detail(item: &LineItem) {
    println!("ID:         {}", item.id);
    println!("Title:      {}", item.title);
    println!("Price:      {}", format_price(item.unit_price));
    println!("Quantity:   {}", item.quantity);
    if let Some(ref resolution) = item.resolution {
        println!("Resolution: {}", resolution);
    }
    if let Some(ref category) = item.category {
        println!("Category:   {}", category);
    }
    if !item.tags.is_empty() {
        println!("Tags:       {}", item.tags.join(", "));
    }
    if let Some(ref thumb) = item.thumbnail_url {
        println!("Thumbnail:  {}", thumb);
    }
}

fn format_price(amount: Decimal) -> String {
    format!("€{:.2}", amount)
}
