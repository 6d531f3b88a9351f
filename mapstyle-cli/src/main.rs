use clap::{Parser, Subcommand, ValueEnum};
use mapstyle::asset::AssetKind;
use mapstyle::snapshot_db::SnapshotDb;
use mapstyle::store::load_snapshot;
use mapstyle::validation::validate_snapshot;
use mapstyle::{Config, Feature, LayerId, StyleId, Store};
use serde_json::json;
use std::path::PathBuf;
use std::process;

/// mapstyle CLI: inspect map layers, their styles and legends
#[derive(Parser)]
#[command(name = "mapstyle", version, about)]
struct Cli {
    /// Configuration file (default: ./mapstyle.yaml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot to read, overriding the configuration (.yaml or .db)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Check the snapshot and report errors, warnings and rejected layers
    Validate,

    /// Show record counts and rejected layers
    Status,

    /// Resolve a style to its flat rendering attributes
    Style {
        /// Style ID
        id: String,
        /// Follow the hover chain
        #[arg(long)]
        hovered: bool,
    },

    /// Build the legend of a layer
    Legend {
        /// Layer ID
        layer: String,
    },

    /// Find the rule that styles a feature with the given attributes
    Match {
        /// Layer ID
        layer: String,
        /// Feature attributes (e.g. --attr type=park --attr height=12)
        #[arg(long = "attr", value_parser = parse_key_value)]
        attrs: Vec<(String, String)>,
    },

    /// Fetch and style one layer, or every layer when none is given
    Resolve {
        /// Layer ID
        layer: Option<String>,
    },

    /// Print the public URL of a stored asset
    Url {
        /// Asset bucket: geojson or image
        kind: AssetKind,
        /// Stored asset path
        path: String,
    },

    /// Create a SQLite snapshot from a YAML snapshot
    Init {
        /// Database file to write
        db_path: PathBuf,
        /// YAML snapshot to import
        #[arg(long)]
        from: PathBuf,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(snapshot) = cli.snapshot {
        config.snapshot = Some(snapshot);
    }

    match cli.command {
        Command::Validate => {
            let path = config
                .snapshot
                .as_deref()
                .ok_or("no snapshot configured (use --snapshot)")?;
            let result = validate_snapshot(&load_snapshot(path)?);
            print_output(
                &json!({
                    "ok": result.is_ok(),
                    "errors": result.errors,
                    "warnings": result.warnings,
                    "rejected_layers": result.rejected_layers,
                }),
                &cli.format,
            )?;
            if !result.is_ok() {
                return Err(format!("{} validation error(s)", result.errors.len()).into());
            }
        }

        Command::Status => {
            let store = Store::open(config)?;
            print_output(&serde_json::to_value(store.status())?, &cli.format)?;
        }

        Command::Style { id, hovered } => {
            let store = Store::open(config)?;
            let style = store.resolve_style(&StyleId::from(id), hovered)?;
            if let Some(e) = style.asset_error() {
                log::warn!("{e}");
            }
            print_output(&serde_json::to_value(style)?, &cli.format)?;
        }

        Command::Legend { layer } => {
            let store = Store::open(config)?;
            let legend = store.legend(&LayerId::from(layer))?;
            print_output(&serde_json::to_value(legend)?, &cli.format)?;
        }

        Command::Match { layer, attrs } => {
            let store = Store::open(config)?;
            let layer = LayerId::from(layer);
            let feature = Feature::with_attributes(attrs.into_iter().map(|(k, v)| (k, attr_value(&v))));

            let output = match store.match_feature(&layer, &feature)? {
                Some(matched) => {
                    let pass = store.begin_pass();
                    json!({
                        "matched": true,
                        "index": matched.index,
                        "rule": matched.rule,
                        "style": pass.resolve_style(&matched.rule.style, false)?,
                        "hover_style": pass.resolve_style(&matched.rule.style, true)?,
                    })
                }
                None => json!({ "matched": false }),
            };
            print_output(&output, &cli.format)?;
        }

        Command::Resolve { layer: Some(layer) } => {
            let store = Store::open(config)?;
            let resolution = store.resolve_layer(&LayerId::from(layer)).await?;
            print_output(&serde_json::to_value(resolution)?, &cli.format)?;
        }

        Command::Resolve { layer: None } => {
            let store = Store::open(config)?;
            let report = store.resolve_all().await;
            let layers: Vec<_> = report
                .outcomes
                .iter()
                .map(|outcome| match &outcome.result {
                    Ok(resolution) => json!({
                        "layer": outcome.layer,
                        "ok": true,
                        "features": resolution.features.len(),
                        "unmatched": resolution.unmatched,
                        "legend_entries": resolution.legend.len(),
                    }),
                    Err(e) => json!({
                        "layer": outcome.layer,
                        "ok": false,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            print_output(
                &json!({ "ok": report.is_success(), "layers": layers }),
                &cli.format,
            )?;
        }

        Command::Url { kind, path } => {
            let url = config.assets.public_url(kind, &path);
            print_output(&json!({ "url": url }), &cli.format)?;
        }

        Command::Init { db_path, from } => {
            let snapshot = mapstyle::schema::parse_snapshot(&from)?;
            let result = validate_snapshot(&snapshot);
            if !result.is_ok() {
                return Err(format!(
                    "{} is not a valid snapshot:\n  - {}",
                    from.display(),
                    result.errors.join("\n  - ")
                )
                .into());
            }

            SnapshotDb::create(&db_path)?.import_snapshot(&snapshot)?;
            print_output(
                &json!({
                    "ok": true,
                    "db": db_path,
                    "layers": snapshot.layers.len(),
                    "styles": snapshot.styles.len(),
                    "style_rules": snapshot.style_rules.len(),
                    "icons": snapshot.icons.len(),
                    "warnings": result.warnings,
                }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Numbers and booleans are typed; anything else stays a string.
fn attr_value(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => value,
        _ => serde_json::Value::String(raw.to_string()),
    }
}
