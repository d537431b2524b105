//! Submit a photo and follow the task to completion

use anyhow::{Context, Result};
use petcast_core::PetcastConfig;
use petcast_gen::{ImagePayload, PollStatus, TaskManager};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct GenerateArgs {
    pub image: PathBuf,
    pub email: Option<String>,
    pub no_wait: bool,
    pub interval: u64,
    pub config: PetcastConfig,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let image = ImagePayload::from_bytes(bytes, None)?;

    let manager = TaskManager::from_config(&args.config)?;
    let start = Instant::now();
    let outcome = manager.submit(Some(image), args.email.as_deref())?;

    if outcome.demo {
        println!("No provider API key configured; demo task returned.");
    }
    println!(
        "Submitted {} to {} as task {}",
        args.image.display(),
        manager.provider_name().unwrap_or("demo"),
        outcome.task_id
    );
    if args.no_wait {
        return Ok(());
    }

    let interval = Duration::from_secs(args.interval.max(1));
    let mut last_progress = None;
    loop {
        let report = manager.poll(&outcome.task_id)?;
        match report.status {
            PollStatus::Succeeded => {
                println!("  Done in {:.1}s", start.elapsed().as_secs_f64());
                match report.model_url {
                    Some(url) => println!("  Model: {}", url),
                    None => println!("  The provider returned no downloadable model"),
                }
                return Ok(());
            }
            PollStatus::Failed => {
                if let Some(err) = report.failure() {
                    return Err(err).with_context(|| format!("Task {}", outcome.task_id));
                }
            }
            PollStatus::InProgress => {
                if last_progress != Some(report.progress) {
                    println!("  Progress: {}%", report.progress);
                    last_progress = Some(report.progress);
                }
            }
            PollStatus::Polling => {
                println!("  {}", report.message.as_deref().unwrap_or("Checking..."));
            }
        }
        std::thread::sleep(interval);
    }
}
