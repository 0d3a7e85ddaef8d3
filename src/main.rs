//! softquad - quad shader interpreter
//!
//! Runs a JSON shader job and prints its outputs as JSON.

mod job;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sq_core::Config;

use crate::job::ShaderJob;

/// Run a shader job on the software quad interpreter
#[derive(Parser, Debug)]
#[command(name = "softquad", version, about)]
struct Args {
    /// Config file (default: the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shader job (JSON)
    job: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("softquad: using default config: {e}");
            Config::default()
        }),
    };
    sq_core::logging::init(&config.debug);

    tracing::info!(job = %args.job.display(), "Starting softquad");

    let text = std::fs::read_to_string(&args.job)
        .with_context(|| format!("reading job {}", args.job.display()))?;
    let job = ShaderJob::from_json(&text)?;
    let output = job.run(&config)?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["softquad", "-c", "sq.toml", "job.json"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("sq.toml")));
        assert_eq!(args.job, PathBuf::from("job.json"));

        assert!(Args::try_parse_from(["softquad"]).is_err());
        assert!(Args::try_parse_from(["softquad", "a.json", "b.json"]).is_err());
    }
}
