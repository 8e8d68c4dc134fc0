use anyhow::Result;
use clap::Parser;
use cxr_review::decode::DecodeClient;
use cxr_review::sequence;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Rebuild a single case and dump the result as pretty JSON, optionally
/// writing every step mask to PNG and probing the decode service.
#[derive(Parser, Debug)]
#[command(name = "inspect", about = "Inspect one annotation case")]
struct Args {
    /// Case directory containing the annotation JSON files
    case: PathBuf,

    /// Where to write the JSON summary
    #[arg(short, long, default_value = "case_inspect.json")]
    out: PathBuf,

    /// Write every step mask as a PNG into this directory
    #[arg(long)]
    masks: Option<PathBuf>,

    /// Send the --prompt texts to a decode service at this base URL
    #[arg(long)]
    decode_url: Option<String>,

    /// Prompt(s) for the decode service, repeatable
    #[arg(long)]
    prompt: Vec<String>,

    /// Session identifier passed to the decode service
    #[arg(long, default_value = "inspect")]
    session: String,
}

#[derive(Serialize)]
struct StepSummary {
    description: String,
    mask_pixels: u64,
}

#[derive(Serialize)]
struct ViewSummary {
    file: String,
    steps: Vec<StepSummary>,
}

#[derive(Serialize)]
struct GroupSummary {
    flag: String,
    caption: String,
    views: Vec<ViewSummary>,
}

#[derive(Serialize)]
struct CaseSummary {
    case: String,
    originals: Vec<String>,
    originals_caption: String,
    groups: Vec<GroupSummary>,
    warnings: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Rebuilding {:?}", args.case);
    let Some(output) = sequence::build_case(&args.case)? else {
        println!("No annotation files in {:?}", args.case);
        return Ok(());
    };
    let sequence = &output.sequence;

    let groups = sequence
        .groups
        .iter()
        .map(|group| GroupSummary {
            flag: group.flag.clone(),
            caption: group.caption.clone(),
            views: group
                .views
                .iter()
                .map(|view| ViewSummary {
                    file: view.file.clone(),
                    steps: view
                        .steps
                        .iter()
                        .map(|step| StepSummary {
                            description: step.description.clone(),
                            mask_pixels: step.mask.pixels().filter(|p| p[0] > 250).count()
                                as u64,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let summary = CaseSummary {
        case: args.case.to_string_lossy().to_string(),
        originals: sequence
            .originals
            .iter()
            .map(|original| original.file.clone())
            .collect(),
        originals_caption: sequence.originals_caption.clone(),
        groups,
        warnings: output.log.deduped(),
    };

    if let Some(mask_dir) = &args.masks {
        std::fs::create_dir_all(mask_dir)?;
        for (group_idx, group) in sequence.groups.iter().enumerate() {
            for view in &group.views {
                for (step_idx, step) in view.steps.iter().enumerate() {
                    let path = mask_dir.join(format!(
                        "{}_group{group_idx}_step{step_idx}.png",
                        file_stem(&view.file)
                    ));
                    step.mask.save(&path)?;
                }
            }
        }
        println!("Wrote step masks to {}", mask_dir.display());
    }

    if let Some(url) = &args.decode_url {
        if args.prompt.is_empty() {
            println!("--decode-url given but no --prompt; skipping decode probe");
        } else {
            let client = DecodeClient::new(url.clone())?;
            match client.decode(&args.prompt, &args.session) {
                Ok(shapes) => {
                    for (prompt, shape) in args.prompt.iter().zip(&shapes) {
                        println!(
                            "decode {:?} -> {} ({} points)",
                            prompt,
                            shape.shape_type,
                            shape.points.len()
                        );
                    }
                }
                Err(err) => println!("decode probe failed, response discarded: {err:#}"),
            }
        }
    }

    let file = File::create(&args.out)?;
    serde_json::to_writer_pretty(file, &summary)?;
    println!("Wrote {}", args.out.display());

    Ok(())
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
        .to_string()
}
