use anyhow::Result;
use clap::Parser;
use cxr_review::{data, sequence, viz};
use indicatif::ProgressBar;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// Walk a root of annotation cases, rebuild the report step sequence for
/// each one and collect every data-quality warning into a CSV report.
#[derive(Parser, Debug)]
#[command(name = "cxr_review", about = "Review chest X-ray annotation cases")]
struct Args {
    /// Root directory containing per-case folders (p{patient}-s{study})
    cases: PathBuf,

    /// Where to write the warnings report
    #[arg(short, long, default_value = "warnings.csv")]
    report: PathBuf,

    /// Export per-step overlay PNGs under this directory, one subfolder
    /// per case
    #[arg(long)]
    overlays: Option<PathBuf>,

    /// Only process the first N cases
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct WarningRow<'a> {
    case: &'a str,
    warning: &'a str,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Discovering cases...");
    let mut case_dirs = data::list_case_dirs(&args.cases)?;
    if let Some(limit) = args.limit {
        case_dirs.truncate(limit);
    }
    println!("Found {} cases.", case_dirs.len());

    let file = File::create(&args.report)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    let pb = ProgressBar::new(case_dirs.len() as u64);
    let mut reviewed = 0usize;
    let mut with_warnings = 0usize;

    for dir in &case_dirs {
        let case = dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown");

        let Some(output) = sequence::build_case(dir)? else {
            pb.inc(1);
            continue;
        };
        reviewed += 1;

        let warnings = output.log.deduped();
        if !warnings.is_empty() {
            with_warnings += 1;
        }
        for warning in &warnings {
            writer.serialize(WarningRow { case, warning })?;
        }

        if let Some(root) = &args.overlays {
            viz::export_case_overlays(&output.sequence, &root.join(case))?;
        }
        pb.inc(1);
    }
    pb.finish_with_message("Review complete");
    writer.flush()?;

    println!(
        "Reviewed {} cases, {} with warnings. Report saved to {}.",
        reviewed,
        with_warnings,
        args.report.display()
    );
    Ok(())
}
