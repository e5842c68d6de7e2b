use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pager_core::{
    compile, parse_with_limits, short_filter_hash, AllowList, Cursor, CursorValues, FieldKind,
    OrderSpec, PageDirection, Value,
};
use pager_db::{
    paginate_query, record_from_json, MemoryBackend, MemoryQuery, PageRequest, PagingPolicy,
};
use runtime::{AppConfig, CliArgs};
use serde_json::{json, Map, Value as Json};
use std::path::{Path, PathBuf};

/// Filter, order and page JSON rows with keyset cursors
#[derive(Parser)]
#[command(name = "pager-cli")]
#[command(about = "Filter, order and page JSON rows with keyset cursors")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Largest page a request may ask for (overrides config)
    #[arg(long, global = true)]
    max_page_size: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a filter expression
    Filter {
        expression: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Parse and validate an ordering such as "name,-created_at"
    Order {
        #[arg(allow_hyphen_values = true)]
        ordering: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Build or inspect cursor tokens
    #[command(subcommand)]
    Cursor(CursorCommand),
    /// Return one page of rows from a JSON array file
    Page(PageArgs),
    /// Check configuration
    Check,
}

#[derive(Subcommand)]
enum CursorCommand {
    /// Encode a cursor from an ordering and the boundary row's values
    Encode {
        /// Signed ordering tokens, e.g. "-created_at,+id"
        #[arg(long, allow_hyphen_values = true)]
        order: String,
        /// JSON object with one value per ordering field
        #[arg(long)]
        values: String,
        /// Mint a previous-page cursor
        #[arg(long)]
        prev: bool,
        /// Bind the cursor to this filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Decode a cursor token
    Decode { token: String },
}

#[derive(Args)]
struct FieldArgs {
    /// Allowed field as NAME=KIND (repeatable); adds to the config's `fields`
    #[arg(long = "field", value_parser = parse_field_arg)]
    fields: Vec<(String, FieldKind)>,
}

#[derive(Args)]
struct PageArgs {
    /// JSON file holding an array of objects
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    filter: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    order: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long)]
    cursor: Option<String>,
    /// Page backward (from the end without a cursor)
    #[arg(long)]
    backward: bool,
    /// Also return a prev cursor on the first page
    #[arg(long)]
    include_prev: bool,
    /// Report how many rows match the filter
    #[arg(long)]
    total: bool,
    #[command(flatten)]
    fields: FieldArgs,
}

fn parse_field_arg(s: &str) -> Result<(String, FieldKind), String> {
    let (name, kind) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=KIND, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty field name in '{s}'"));
    }
    Ok((name.to_string(), kind.parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        max_page_size: cli.max_page_size,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    // Relative log files land next to the config file, or in the working directory.
    let base_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, &base_dir);
    tracing::debug!(config = ?args.config, "pager-cli starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("no command given; see --help");
    };
    let output = match command {
        Commands::Filter { expression, fields } => filter_cmd(&config, &expression, &fields)?,
        Commands::Order { ordering, fields } => order_cmd(&config, &ordering, &fields)?,
        Commands::Cursor(CursorCommand::Encode {
            order,
            values,
            prev,
            filter,
        }) => cursor_encode_cmd(&config, &order, &values, prev, filter.as_deref())?,
        Commands::Cursor(CursorCommand::Decode { token }) => cursor_decode_cmd(&token)?,
        Commands::Page(page) => page_cmd(&config, &page).await?,
        Commands::Check => check_cmd(&config)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Config `fields` plus `--field` arguments; the arguments win.
fn allow_list(config: &AppConfig, args: &FieldArgs) -> Result<AllowList<String>> {
    let mut kinds = config.field_kinds()?;
    kinds.extend(args.fields.iter().cloned());
    Ok(AllowList::from_kinds(kinds))
}

fn with_code(e: impl Into<pager_core::Error>) -> anyhow::Error {
    let e = e.into();
    anyhow!("{} [{}]", e, e.code())
}

fn filter_cmd(config: &AppConfig, expression: &str, args: &FieldArgs) -> Result<Json> {
    let allow = allow_list(config, args)?;
    let tree = parse_with_limits(expression, &config.filter.parser_limits()).map_err(with_code)?;
    let predicate = compile(&tree, &allow).map_err(with_code)?;

    let mut fields: Vec<&str> = predicate
        .fields()
        .into_iter()
        .map(|f| f.name.as_str())
        .collect();
    fields.sort_unstable();
    fields.dedup();

    Ok(json!({
        "expression": tree.to_string(),
        "nodes": tree.node_count(),
        "fields": fields,
        "fingerprint": short_filter_hash(Some(&tree)),
    }))
}

fn order_cmd(config: &AppConfig, ordering: &str, args: &FieldArgs) -> Result<Json> {
    let allow = allow_list(config, args)?;
    let spec = OrderSpec::parse(ordering, &allow)
        .map_err(with_code)?
        .ensure_tiebreaker(&config.paging.tiebreaker, config.paging.tiebreaker_dir);
    Ok(json!({
        "order": spec.to_string(),
        "signed": spec.to_signed_tokens(),
    }))
}

fn cursor_encode_cmd(
    config: &AppConfig,
    order: &str,
    values: &str,
    prev: bool,
    filter: Option<&str>,
) -> Result<Json> {
    let ordering = OrderSpec::from_signed_tokens(order).map_err(with_code)?;
    let raw: Map<String, Json> =
        serde_json::from_str(values).context("--values must be a JSON object")?;

    let mut cursor_values = CursorValues::new();
    for (field, json) in raw {
        let value = Value::from_json(&json)
            .ok_or_else(|| anyhow!("value for '{field}' must be a scalar"))?;
        cursor_values.insert(field, value);
    }

    let filter_hash = match filter {
        Some(text) => short_filter_hash(Some(
            &parse_with_limits(text, &config.filter.parser_limits()).map_err(with_code)?,
        )),
        None => None,
    };
    let direction = if prev {
        PageDirection::Backward
    } else {
        PageDirection::Forward
    };

    let cursor = Cursor::new(ordering, cursor_values)
        .with_direction(direction)
        .with_filter_hash(filter_hash)
        .coerce_values(&config.field_kinds()?)
        .map_err(with_code)?;
    Ok(json!({ "cursor": cursor.encode().map_err(with_code)? }))
}

fn cursor_decode_cmd(token: &str) -> Result<Json> {
    let cursor = Cursor::decode(token).map_err(with_code)?;
    let values: Map<String, Json> = cursor
        .values
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Ok(json!({
        "ordering": cursor.ordering.to_signed_tokens(),
        "order": cursor.ordering.to_string(),
        "values": values,
        "direction": cursor.direction.wire_name(),
        "filter_hash": cursor.filter_hash,
    }))
}

/// Kinds for fields nobody declared, read off the JSON types of the rows.
fn infer_kinds(rows: &[Map<String, Json>], allow: &mut AllowList<String>) {
    for row in rows {
        for (name, json) in row {
            if allow.contains(name) {
                continue;
            }
            let kind = match json {
                Json::Bool(_) => FieldKind::Bool,
                Json::Number(n) if n.is_i64() => FieldKind::I64,
                Json::Number(_) => FieldKind::F64,
                Json::String(_) => FieldKind::String,
                _ => continue,
            };
            allow.insert(name.clone(), name.clone(), kind);
        }
    }
}

async fn page_cmd(config: &AppConfig, args: &PageArgs) -> Result<Json> {
    let raw = std::fs::read_to_string(&args.data)
        .with_context(|| format!("Failed to read {}", args.data.display()))?;
    let rows: Vec<Map<String, Json>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must hold a JSON array of objects", args.data.display()))?;

    let mut allow = allow_list(config, &args.fields)?;
    infer_kinds(&rows, &mut allow);
    let records = rows
        .iter()
        .map(|row| record_from_json(row, &allow))
        .collect::<pager_db::Result<Vec<_>>>()?;
    tracing::debug!(rows = records.len(), fields = %allow.describe(), "data loaded");

    let policy = PagingPolicy {
        limits: config.paging.limit_cfg(),
        tiebreaker: config.paging.tiebreaker.clone(),
        tiebreaker_dir: config.paging.tiebreaker_dir,
        parser_limits: config.filter.parser_limits(),
    };
    let mut request = PageRequest {
        filter: args.filter.clone(),
        order: args.order.clone(),
        limit: args.limit,
        cursor: args.cursor.clone(),
        include_prev_cursor_on_first_page: args.include_prev
            || config.paging.include_prev_cursor_on_first_page,
        with_total: args.total,
        ..PageRequest::default()
    };
    if args.backward {
        request = request.direction(PageDirection::Backward);
    }

    let page = paginate_query(
        &MemoryBackend,
        MemoryQuery::new(records),
        &allow,
        &request,
        &policy,
    )
    .await
    .map_err(|e| anyhow!("{} [{}]", e, e.code()))?;

    Ok(serde_json::to_value(&page)?)
}

fn check_cmd(config: &AppConfig) -> Result<Json> {
    let kinds = config.field_kinds()?;
    if !kinds.is_empty() && !kinds.contains_key(&config.paging.tiebreaker) {
        bail!(
            "tiebreaker '{}' is not among the configured fields",
            config.paging.tiebreaker
        );
    }
    tracing::info!("Configuration is valid");
    Ok(json!({
        "status": "ok",
        "fields": kinds.len(),
        "tiebreaker": config.paging.tiebreaker,
        "max_page_size": config.paging.max_page_size,
    }))
}
