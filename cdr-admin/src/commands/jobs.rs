//! `cdr-admin jobs`: enqueue, inspect and stop batch jobs.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;

use cdr::jobs::{BatchJob, BatchStatus, JobArgs, JobQuery, JobStatusReport, LoggingSink, Transition};
use cdr::RequestContext;

use super::emit;

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Queue a job; refused while another job with the same name is active
    Enqueue {
        /// Job name
        name: String,
        /// Command the worker dispatches on (publish, global-link-change, ...)
        command: String,
        /// Job argument as key=value (repeatable)
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
        /// Address to notify when the job ends (repeatable)
        #[arg(long)]
        notify: Vec<String>,
    },

    /// Show a job with its status history
    Status {
        id: i64,
    },

    /// List jobs, newest first
    List {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        /// Only jobs queued within this many days
        #[arg(long)]
        age_days: Option<u32>,
        /// Queued, Running, Success, Failure, Cancelled, or `active`
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Cancel a queued or running job
    Cancel {
        id: i64,
    },

    /// Mark stalled jobs failed
    Fail {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

/// Splits `key=value` arguments; the value may itself contain `=`.
pub fn parse_args(pairs: &[String]) -> Result<JobArgs> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => bail!("job argument '{}' is not KEY=VALUE", pair),
        })
        .collect()
}

#[derive(Serialize)]
struct StatusView {
    #[serde(flatten)]
    report: JobStatusReport,
    transitions: Vec<Transition>,
}

fn print_jobs(jobs: &[BatchJob]) {
    if jobs.is_empty() {
        println!("No matching jobs");
    }
    for job in jobs {
        println!(
            "{:>6}  {:<10} {:<24} {:<28} {}",
            job.id,
            job.status.to_string(),
            job.queued_at,
            job.name,
            job.progress.as_deref().unwrap_or("")
        );
    }
}

pub fn run(cmd: JobsCommand, ctx: &RequestContext, json: bool) -> Result<()> {
    let controller = ctx.jobs(Arc::new(LoggingSink));
    match cmd {
        JobsCommand::Enqueue {
            name,
            command,
            args,
            notify,
        } => {
            let id = controller.enqueue(&name, &command, parse_args(&args)?, notify)?;
            emit(&id, json, |id| println!("Queued job {}", id))
        }
        JobsCommand::Status { id } => {
            let view = StatusView {
                report: controller.status(id)?,
                transitions: controller.transitions(id)?,
            };
            emit(&view, json, |v| {
                println!("Job {} ({}): {}", v.report.id, v.report.name, v.report.status);
                if let Some(progress) = &v.report.progress {
                    println!("  progress: {}", progress);
                }
                for t in &v.transitions {
                    println!(
                        "  {}  {} -> {}  {}",
                        t.at,
                        t.from.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                        t.to,
                        t.message.as_deref().unwrap_or("")
                    );
                }
            })
        }
        JobsCommand::List {
            id,
            name,
            age_days,
            status,
            limit,
        } => {
            let jobs = match status.as_deref().map(str::trim) {
                Some(s) if s.eq_ignore_ascii_case("active") => controller.list_active(name.as_deref())?,
                other => controller.query(&JobQuery {
                    id,
                    name,
                    age_days,
                    status: other.map(BatchStatus::parse).transpose()?,
                    limit: Some(limit),
                })?,
            };
            emit(jobs.as_slice(), json, print_jobs)
        }
        JobsCommand::Cancel { id } => {
            let status = controller.cancel(id)?;
            emit(&status, json, |s| println!("Job {} is now {}", id, s))
        }
        JobsCommand::Fail { ids } => {
            let failed = controller.fail_stalled(&ids)?;
            emit(&failed, json, |ids| println!("Failed {} jobs: {:?}", ids.len(), ids))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = parse_args(&["subset=Export".to_string(), "filters=set:A|name:B=C".to_string()]).unwrap();
        assert_eq!(args[0], ("subset".to_string(), "Export".to_string()));
        assert_eq!(args[1].1, "set:A|name:B=C");
        assert!(parse_args(&["novalue".to_string()]).is_err());
        assert!(parse_args(&["=x".to_string()]).is_err());
    }
}
