//! stockscan - interactive barcode inventory logger.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::info;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use stockscan_lib::{
    bootstrap,
    catalog::CatalogLookup,
    commands,
    db::{EntryDraft, InventoryEntry, ProductRecord, Unit},
    default_data_dir, init_logging,
    session::{CaptureReport, CaptureStatus, Phase, ScanSessionState},
    AppOptions, AppState,
};

/// Command-line arguments for stockscan
#[derive(Parser, Debug)]
#[command(name = "stockscan")]
#[command(about = "Scan barcodes and log stock counts")]
#[command(version)]
struct Args {
    /// Directory holding the database and settings.json
    #[arg(short, long, env = "STOCKSCAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Skip the vision-model fallback for this run
    #[arg(long)]
    no_vision: bool,
}

const HELP: &str = "\
commands:
  scan <image>                 decode a barcode photo
  code <barcode>               type a barcode instead
  yes | no                     accept or reject a suggested barcode
  save <qty> [unit]            log the resolved product
  retry                        resubmit the last entry that failed to save
  reset                        start over
  add <barcode> | <name> | <brand>
                               register a product
  find <text>                  search products
  letter <A-Z|0-9>             list products by first letter
  history [n]                  recent entries
  stock                        totals per product and unit
  export <file.csv>            write the whole log as CSV
  unit <unit>                  set the default unit
  vision on|off                use the vision fallback from the next start
  status                       show the current scan
  quit";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Scan(PathBuf),
    Code(String),
    Confirm(bool),
    Save { quantity: f64, unit: Option<Unit> },
    Retry,
    Reset,
    Add { barcode: String, name: String, brand: String },
    Find(String),
    Letter(String),
    History(u32),
    Stock,
    Export(PathBuf),
    DefaultUnit(String),
    Vision(bool),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    let require = |what: &str| -> Result<String> {
        if rest.is_empty() {
            bail!("usage: {verb} <{what}>");
        }
        Ok(rest.to_string())
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "scan" => Command::Scan(PathBuf::from(require("image")?)),
        "code" => Command::Code(require("barcode")?),
        "yes" | "y" | "accept" => Command::Confirm(true),
        "no" | "n" | "reject" => Command::Confirm(false),
        "save" => {
            let mut parts = rest.split_whitespace();
            let quantity = parts
                .next()
                .ok_or_else(|| anyhow!("usage: save <qty> [unit]"))?;
            let quantity: f64 = quantity
                .parse()
                .with_context(|| format!("'{quantity}' is not a number"))?;
            let unit = parts.next().map(str::parse::<Unit>).transpose()?;
            Command::Save { quantity, unit }
        }
        "retry" => Command::Retry,
        "reset" => Command::Reset,
        "add" => {
            let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
            let [barcode, name, brand] = fields.as_slice() else {
                bail!("usage: add <barcode> | <name> | <brand>");
            };
            Command::Add {
                barcode: barcode.to_string(),
                name: name.to_string(),
                brand: brand.to_string(),
            }
        }
        "find" => Command::Find(rest.to_string()),
        "letter" => Command::Letter(require("letter")?),
        "history" => {
            let limit = if rest.is_empty() {
                10
            } else {
                rest.parse()
                    .with_context(|| format!("'{rest}' is not a count"))?
            };
            Command::History(limit)
        }
        "stock" => Command::Stock,
        "export" => Command::Export(PathBuf::from(require("file")?)),
        "unit" => Command::DefaultUnit(require("unit")?),
        "vision" => match rest.to_ascii_lowercase().as_str() {
            "on" => Command::Vision(true),
            "off" => Command::Vision(false),
            _ => bail!("usage: vision on|off"),
        },
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(Some(command))
}

fn describe_state(state: &ScanSessionState) -> String {
    match state.phase {
        Phase::Idle => "ready to scan".to_string(),
        Phase::Decoding => "decoding...".to_string(),
        Phase::Rejected if state.decode_faulted => {
            "decoder unavailable; scan the same photo again or type the code".to_string()
        }
        Phase::Rejected => "no barcode found; try another photo or type the code".to_string(),
        Phase::PendingConfirm => match &state.pending {
            Some(pending) => format!(
                "read {} ({} confidence), is that right? yes/no",
                pending.value, pending.confidence
            ),
            None => "awaiting confirmation".to_string(),
        },
        Phase::Accepted => {
            let barcode = state.resolved_barcode.as_deref().unwrap_or("?");
            match &state.product {
                Some(CatalogLookup::Found(product)) => format!(
                    "{barcode}: {} ({}); save <qty> [unit] to log it",
                    product.name, product.brand
                ),
                Some(CatalogLookup::Unknown) => format!(
                    "{barcode}: unresolved product; add {barcode} | <name> | <brand>"
                ),
                None => format!("{barcode}: looking up..."),
            }
        }
    }
}

fn describe_capture(report: &CaptureReport) -> String {
    let mut lines: Vec<String> = report
        .diagnostics
        .iter()
        .map(|diagnostic| format!("  note: {diagnostic}"))
        .collect();

    let headline = match report.status {
        CaptureStatus::Duplicate => format!("same photo as before; {}", describe_state(&report.state)),
        CaptureStatus::Superseded => "result arrived after the scan moved on; ignored".to_string(),
        CaptureStatus::Processed => describe_state(&report.state),
    };
    lines.insert(0, headline);
    lines.join("\n")
}

fn describe_entry(entry: &InventoryEntry) -> String {
    format!(
        "{}  {} {} {} ({})",
        entry.recorded_at.format("%Y-%m-%d %H:%M"),
        entry.quantity,
        entry.unit,
        entry.product_name,
        entry.barcode
    )
}

fn describe_products(products: &[ProductRecord]) -> String {
    if products.is_empty() {
        return "no products".to_string();
    }
    products
        .iter()
        .map(|p| format!("{}  {} ({})", p.barcode, p.name, p.brand))
        .collect::<Vec<_>>()
        .join("\n")
}

struct Repl {
    state: AppState,
    failed_draft: Option<EntryDraft>,
}

impl Repl {
    /// Returns `false` when the user asked to quit.
    async fn handle(&mut self, command: Command) -> Result<bool, String> {
        let output = match command {
            Command::Scan(path) => {
                describe_capture(&commands::scan_file(&self.state, &path).await?)
            }
            Command::Code(barcode) => {
                describe_state(&commands::enter_barcode(&self.state, &barcode).await?)
            }
            Command::Confirm(accept) => {
                describe_state(&commands::confirm_barcode(&self.state, accept).await?)
            }
            Command::Save { quantity, unit } => self.save(quantity, unit).await?,
            Command::Retry => {
                let draft = self
                    .failed_draft
                    .ok_or_else(|| "nothing to retry".to_string())?;
                self.save(draft.quantity, Some(draft.unit)).await?
            }
            Command::Reset => {
                self.failed_draft = None;
                describe_state(&commands::reset_session(&self.state).await)
            }
            Command::Add {
                barcode,
                name,
                brand,
            } => {
                let product =
                    commands::register_product(&self.state, &barcode, &name, &brand).await?;
                let status = commands::session_status(&self.state).await;
                format!(
                    "registered {} ({})\n{}",
                    product.name,
                    product.barcode,
                    describe_state(&status)
                )
            }
            Command::Find(query) => {
                describe_products(&commands::search_products(&self.state, &query).await?)
            }
            Command::Letter(letter) => {
                describe_products(&commands::products_by_letter(&self.state, &letter).await?)
            }
            Command::History(limit) => {
                let entries = commands::entry_history(&self.state, limit).await?;
                if entries.is_empty() {
                    "no entries yet".to_string()
                } else {
                    entries.iter().map(describe_entry).collect::<Vec<_>>().join("\n")
                }
            }
            Command::Stock => {
                let totals = commands::stock_totals(&self.state).await?;
                if totals.is_empty() {
                    "no stock logged".to_string()
                } else {
                    totals
                        .iter()
                        .map(|t| {
                            format!(
                                "{}  {} {} ({} entries)",
                                t.product_name, t.quantity, t.unit, t.entries
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Export(path) => {
                let rows = commands::export_entries(&self.state, &path).await?;
                format!("wrote {rows} entries to {}", path.display())
            }
            Command::DefaultUnit(unit) => {
                let unit = commands::set_default_unit(&self.state, &unit)?;
                format!("default unit is now {unit}")
            }
            Command::Vision(enabled) => {
                commands::set_vision_enabled(&self.state, enabled)?;
                let switch = if enabled { "on" } else { "off" };
                format!("vision fallback {switch} from the next start")
            }
            Command::Status => describe_state(&commands::session_status(&self.state).await),
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(false),
        };

        println!("{output}");
        Ok(true)
    }

    async fn save(&mut self, quantity: f64, unit: Option<Unit>) -> Result<String, String> {
        match commands::submit_entry(&self.state, quantity, unit).await {
            Ok(entry) => {
                self.failed_draft = None;
                Ok(format!("saved: {}", describe_entry(&entry)))
            }
            Err(failure) => {
                if failure.draft.is_some() {
                    self.failed_draft = failure.draft;
                    return Err(format!("{failure} (type 'retry' to resubmit)"));
                }
                Err(failure.message)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let options = AppOptions {
        data_dir: args.data_dir.unwrap_or_else(default_data_dir),
        allow_vision: !args.no_vision,
    };

    info!("stockscan v{}", env!("CARGO_PKG_VERSION"));
    let state = bootstrap(&options).context("failed to start stockscan")?;
    let mut repl = Repl {
        state,
        failed_draft: None,
    };

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("type 'help' for commands");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err:#}");
                continue;
            }
        };

        match repl.handle(command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(message) => eprintln!("{message}"),
        }
    }

    Ok(())
}
