use crate::plan::{ResolvedPlan, ResolvedStep};
use crate::runner::artifact_path;
use hashbrown::HashMap;
use rayon::prelude::*;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// A problem that would make a step fail, found without running anything.
/// Step numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    MissingTool { step: usize, program: String },
    MissingInput { step: usize, input: PathBuf },
    InputFromLaterStep { step: usize, input: PathBuf, producer: usize },
    MissingIncludeDir { step: usize, dir: PathBuf },
    DuplicateOutput { step: usize, output: PathBuf, first: usize },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Issue::*;
        match self {
            MissingTool { step, program } => {
                write!(f, "[{}] program `{}` not found on PATH", step, program)
            }
            MissingInput { step, input } => {
                write!(f, "[{}] input {:?} does not exist and no earlier step produces it", step, input)
            }
            InputFromLaterStep { step, input, producer } => write!(
                f,
                "[{}] input {:?} is only produced later, by step {}",
                step, input, producer
            ),
            MissingIncludeDir { step, dir } => {
                write!(f, "[{}] include directory {:?} does not exist", step, dir)
            }
            DuplicateOutput { step, output, first } => write!(
                f,
                "[{}] output {:?} is already produced by step {}",
                step, output, first
            ),
        }
    }
}

/// Validates the declared order of `plan` against the filesystem. Issues are
/// returned grouped by step, in step order.
pub fn check(plan: &ResolvedPlan, out_dir: &Path, search_path: Option<&OsStr>) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut producers: HashMap<PathBuf, usize> = HashMap::new();
    for (i, step) in plan.steps.iter().enumerate() {
        for output in &step.outputs {
            let key = artifact_path(out_dir, output);
            match producers.get(&key) {
                Some(&first) => issues.push(Issue::DuplicateOutput {
                    step: i + 1,
                    output: output.clone(),
                    first,
                }),
                None => {
                    producers.insert(key, i + 1);
                }
            }
        }
    }

    let per_step: Vec<Vec<Issue>> = plan
        .steps
        .par_iter()
        .enumerate()
        .map(|(i, step)| check_step(i + 1, step, &producers, out_dir, search_path))
        .collect();
    issues.extend(per_step.into_iter().flatten());
    issues.sort_by_key(step_of);
    issues
}

fn step_of(issue: &Issue) -> usize {
    use Issue::*;
    match issue {
        MissingTool { step, .. }
        | MissingInput { step, .. }
        | InputFromLaterStep { step, .. }
        | MissingIncludeDir { step, .. }
        | DuplicateOutput { step, .. } => *step,
    }
}

fn check_step(
    index: usize,
    step: &ResolvedStep,
    producers: &HashMap<PathBuf, usize>,
    out_dir: &Path,
    search_path: Option<&OsStr>,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    if find_program(&step.program, out_dir, search_path).is_none() {
        issues.push(Issue::MissingTool {
            step: index,
            program: step.program.clone(),
        });
    }
    for input in &step.inputs {
        let path = artifact_path(out_dir, input);
        // a step reading its own output (e.g. `ar rcs` updating an archive)
        // needs the file to exist beforehand
        match producers.get(&path).copied() {
            Some(producer) if producer < index => {}
            Some(producer) if producer > index => issues.push(Issue::InputFromLaterStep {
                step: index,
                input: input.clone(),
                producer,
            }),
            _ if path.exists() => {}
            _ => issues.push(Issue::MissingInput {
                step: index,
                input: input.clone(),
            }),
        }
    }
    issues.extend(
        step.args
            .iter()
            .filter_map(|x| x.strip_prefix("-I"))
            .filter(|x| !x.is_empty())
            .map(PathBuf::from)
            .filter(|x| !artifact_path(out_dir, x).is_dir())
            .map(|dir| Issue::MissingIncludeDir { step: index, dir }),
    );
    issues
}

/// Resolves `program` the way a spawn would: names containing a separator are
/// paths, anything else is looked up in `search_path`.
pub fn find_program(program: &str, out_dir: &Path, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = artifact_path(out_dir, Path::new(program));
        return if is_executable(&path) { Some(path) } else { None };
    }
    std::env::split_paths(search_path?)
        .map(|dir| dir.join(program))
        .find(|x| is_executable(x))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|x| x.is_file() && x.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
