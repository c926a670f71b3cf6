//! ragbag CLI
//!
//! Command-line front end for:
//! - Deduplicating JSON arrays per innermost group (`unique`)
//! - Grouping positions by one or more key arrays (`group-by`)
//! - Walking through extract / clone on a small sample store (`demo`)
//!
//! Inputs are nested JSON arrays; `-` reads standard input.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ragbag_core::{
    allocate_explicit_schema, AllocationId, DType, DataBag, DataBagImpl, DataItem, DataSlice,
    DataSliceImpl, JaggedShape, ObjectKind,
};
use ragbag_ops::OpsConfig;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

mod json;

#[derive(Parser)]
#[command(name = "ragbag")]
#[command(author, version, about = "ragbag: schema-typed copy-on-write object store")]
struct Cli {
    /// Operator configuration (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unique values of the innermost dimension.
    Unique {
        /// Nested JSON array, or `-` for stdin.
        input: PathBuf,
        #[arg(long)]
        sort: bool,
    },

    /// Group positions of the innermost dimension by key.
    ///
    /// Several inputs form a composite key; all must share one shape.
    GroupBy {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        sort: bool,
    },

    /// Build a sample store, then print what extract and clone keep.
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => OpsConfig::from_path(path)?,
        None => OpsConfig::default(),
    };
    debug!(?config, "loaded operator config");

    match cli.command {
        Commands::Unique { input, sort } => cmd_unique(&input, sort, &config),
        Commands::GroupBy { inputs, sort } => cmd_group_by(&inputs, sort, &config),
        Commands::Demo => cmd_demo(&config),
    }
}

fn read_slice(path: &Path) -> Result<DataSlice> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?;
    let ds = json::slice_from_json(&value)
        .with_context(|| format!("unsupported array in {}", path.display()))?;
    debug!(path = %path.display(), rank = ds.rank(), size = ds.size(), "read input");
    Ok(ds)
}

fn cmd_unique(input: &Path, sort: bool, config: &OpsConfig) -> Result<()> {
    let x = read_slice(input)?;
    let result = ragbag_ops::unique(&x, sort, config)?;
    println!("{}", json::slice_to_json(&result));
    Ok(())
}

fn cmd_group_by(inputs: &[PathBuf], sort: bool, config: &OpsConfig) -> Result<()> {
    let keys = inputs
        .iter()
        .map(|p| read_slice(p))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&DataSlice> = keys.iter().collect();
    let result = ragbag_ops::group_by_indices(&refs, sort, config)?;
    println!("{}", json::slice_to_json(&result));
    Ok(())
}

fn print_bag(title: &str, bag: &DataBagImpl) {
    println!("{}", title.cyan().bold());
    if bag.is_empty() {
        println!("  (empty)");
    }
    for line in bag.content().to_string().lines() {
        println!("  {line}");
    }
    println!();
}

fn result_bag(ds: &DataSlice) -> Result<std::sync::Arc<DataBagImpl>> {
    ds.bag()
        .map(|bag| bag.impl_snapshot())
        .context("operation returned a slice without a bag")
}

fn cmd_demo(config: &OpsConfig) -> Result<()> {
    let person = allocate_explicit_schema();
    let people = AllocationId::new(ObjectKind::Entity, 3);
    let ids: Vec<_> = (0..3).map(|i| people.object_at(i)).collect();

    let mut base = DataBagImpl::new();
    base.set_schema_attr(person, "name", DType::Text.into())?;
    base.set_schema_attr(person, "friend", person.into())?;
    for (i, name) in ["ada", "grace", "edsger"].iter().enumerate() {
        base.set_attr(ids[i], "name", (*name).into());
        base.set_attr(ids[i], "scratch", (i as i32).into());
    }
    base.set_attr(ids[0], "friend", ids[1].into());
    base.set_attr(ids[1], "friend", ids[0].into());

    // Edits layered on top of the frozen base.
    let mut edits = DataBagImpl::new();
    edits.set_attr(ids[1], "name", "grace h.".into());
    let store = DataBag::immutable_empty_with_fallbacks([
        DataBag::from_impl(edits),
        DataBag::immutable_from_impl(base),
    ]);

    let roots = DataSlice::from_impl(
        DataSliceImpl::from_values([DataItem::from(ids[0])]),
        JaggedShape::flat(1),
        person.into(),
        Some(store.clone()),
    )?;
    print_bag("store (flattened)", &store.flattened()?);

    let extracted = ragbag_ops::extract(&roots, config)?;
    let extracted_bag = result_bag(&extracted)?;
    print_bag("extract", &extracted_bag);

    let cloned = ragbag_ops::clone(&roots, config)?;
    print_bag("clone", &*result_bag(&cloned)?);

    println!(
        "{} extract kept {} attributes, clone re-keyed {} root(s)",
        "ok".green().bold(),
        extracted_bag.content().attrs.len(),
        cloned.size()
    );
    Ok(())
}
