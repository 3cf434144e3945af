use crate::error::{BuildError, Result};
use crate::plan::{ResolvedPlan, ResolvedStep};
use log::*;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Attempt every step even after a failure, and treat the run as a success.
    pub keep_going: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: usize,
    pub failures: Vec<BuildError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the steps one after another in `out_dir`, blocking on each child.
///
/// Without `keep_going` the first failing step is returned as the error and
/// nothing after it is spawned.
pub fn run(plan: &ResolvedPlan, out_dir: &Path, options: RunOptions) -> Result<RunReport> {
    let total = plan.steps.len();
    let mut report = RunReport::default();
    for (i, step) in plan.steps.iter().enumerate() {
        let index = i + 1;
        info!("[{}/{}] {}", index, total, step.description);
        if options.dry_run {
            info!("{}", step.command_line());
            continue;
        }
        debug!("{}", step.command_line());
        report.executed += 1;
        match run_step(index, step, out_dir) {
            Ok(()) => {}
            Err(e) if options.keep_going => {
                warn!("{}", e);
                report.failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

fn run_step(index: usize, step: &ResolvedStep, out_dir: &Path) -> Result<()> {
    let status = Command::new(&step.program)
        .args(&step.args)
        .current_dir(out_dir)
        .status()
        .map_err(|source| BuildError::Spawn {
            index,
            description: step.description.clone(),
            program: step.program.clone(),
            source,
        })?;
    if !status.success() {
        return Err(BuildError::StepFailed {
            index,
            description: step.description.clone(),
            command: step.command_line(),
            status,
        });
    }
    if let Some(output) = step
        .outputs
        .iter()
        .find(|x| !artifact_path(out_dir, x).exists())
    {
        return Err(BuildError::MissingOutput {
            index,
            description: step.description.clone(),
            output: output.clone(),
        });
    }
    trace!("[{}] produced {:?}", index, step.outputs);
    Ok(())
}

/// Relative artifact paths are relative to the output directory.
pub fn artifact_path(out_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        out_dir.join(path)
    }
}
