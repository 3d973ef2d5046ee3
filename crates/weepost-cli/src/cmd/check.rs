//! `weepost check` - validate configuration and preview projections

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use weepost_core::{Config, Sample};

use super::new_table;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Project this sample (a JSON object) and print the resulting document
    #[arg(short, long)]
    pub sample: Option<String>,
}

pub fn run(args: CheckArgs, config: &Config) -> Result<()> {
    let worker_config = config.worker_config()?;
    let projector = config.projector()?;

    let mut table = new_table(&["Field", "Expression", "Reads"]);
    for (field, source, reads) in projector.describe() {
        table.add_row(vec![
            Cell::new(field),
            Cell::new(source),
            Cell::new(reads.join(", ")),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!(
        "{} filters OK, posting to {}",
        projector.len(),
        worker_config.endpoint
    );

    if let Some(raw) = args.sample {
        let sample = Sample::from_json(&raw).context("invalid --sample")?;
        let document = projector.project(&sample)?;
        let mut projected = new_table(&["Field", "Value"]);
        for (field, value) in document.iter() {
            projected.add_row(vec![Cell::new(field), Cell::new(value)]);
        }
        eprintln!("\n{projected}");
        println!(
            "{}",
            serde_json::to_string_pretty(&document).context("failed to encode document")?
        );
    }
    Ok(())
}
