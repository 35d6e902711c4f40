//! `flowforge jobs` - list persisted jobs.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use flowforge_config::FlowforgeConfig;
use flowforge_core::JobStore;
use flowforge_storage::RedbJobStore;

#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Show only the newest N jobs.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn execute(args: JobsArgs, config_path: Option<&Path>) -> Result<()> {
    let config = FlowforgeConfig::load(config_path)?;
    let store = RedbJobStore::open(config.job_store_path())?;

    let jobs = store.list_jobs()?;
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }

    for job in jobs.iter().take(args.limit) {
        let status = format!("{:?}", job.status).to_uppercase();
        print!(
            "{}  {:<9}  priority {:>3}  created {}",
            job.id,
            status,
            job.priority,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &job.error_message {
            print!("  ({error})");
        }
        println!();
    }
    Ok(())
}
