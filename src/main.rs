use crate::error::{BuildError, Result};
use crate::plan::{parse_define, BuildPlan, ResolvedPlan};
use crate::runner::RunOptions;
use crate::script::ScriptType;
use log::*;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::exit;
use structopt::StructOpt;

mod check;
mod error;
mod plan;
mod runner;
mod script;

#[derive(StructOpt, Debug)]
struct PlanOpt {
    #[structopt(short, long, env = "BUILDIT_PLAN",
        help = "path to a JSON build plan, the built-in raptor plan if absent")]
    plan: Option<PathBuf>,
    #[structopt(short, long, env = "BUILDIT_BASE_DIR",
        help = "value of {base}, defaults to the plan's directory or the current directory")]
    base_dir: Option<PathBuf>,
    #[structopt(short = "C", long, default_value = ".",
        help = "directory the steps run in and write their artifacts to")]
    out_dir: PathBuf,
    #[structopt(short = "D", long = "define", number_of_values = 1,
        parse(try_from_str = parse_define), help = "set a plan variable, KEY=VALUE")]
    defines: Vec<(String, String)>,
    #[structopt(short, long, parse(from_occurrences), help = "more logging, repeat for trace")]
    verbose: u8,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "buildit")]
enum Opt {
    #[structopt(about = "run the build steps in order")]
    Run {
        #[structopt(flatten)]
        plan: PlanOpt,
        #[structopt(short, long, help = "attempt every step and exit successfully regardless of failures")]
        keep_going: bool,
        #[structopt(short = "n", long, help = "log the commands without running them")]
        dry_run: bool,
    },
    #[structopt(about = "check tools, inputs and include directories without building")]
    Check {
        #[structopt(flatten)]
        plan: PlanOpt,
    },
    #[structopt(about = "list the build steps")]
    List {
        #[structopt(flatten)]
        plan: PlanOpt,
    },
    #[structopt(about = "render the build as a standalone script")]
    Script {
        #[structopt(flatten)]
        plan: PlanOpt,
        #[structopt(short = "t", long = "type", possible_values = &["sh", "json"],
            default_value = "sh", help = "the type of script")]
        script_type: ScriptType,
        #[structopt(short, long, help = "path to the output file, stdout if absent")]
        output: Option<PathBuf>,
    },
}

impl PlanOpt {
    fn base_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir().map_err(BuildError::CurrentDir)?;
        Ok(resolve_base_dir(self.base_dir.as_deref(), self.plan.as_deref(), &cwd))
    }

    fn get_plan(&self) -> Result<ResolvedPlan> {
        let plan = match &self.plan {
            Some(path) => BuildPlan::load(path)?,
            None => BuildPlan::raptor(),
        };
        plan.resolve(&self.base_dir()?, &self.defines)
    }
}

impl Opt {
    fn plan_opt(&self) -> &PlanOpt {
        use Opt::*;
        match self {
            Run { plan, .. } => plan,
            Check { plan } => plan,
            List { plan } => plan,
            Script { plan, .. } => plan,
        }
    }
}

/// `{base}` is the explicit base directory, else the plan file's directory,
/// else `cwd`. Relative results are taken against `cwd`.
fn resolve_base_dir(base_dir: Option<&Path>, plan: Option<&Path>, cwd: &Path) -> PathBuf {
    let base = match (base_dir, plan) {
        (Some(dir), _) => dir.to_path_buf(),
        (None, Some(plan)) => plan.parent().map(Path::to_path_buf).unwrap_or_default(),
        (None, None) => PathBuf::new(),
    };
    if base.as_os_str().is_empty() {
        cwd.to_path_buf()
    } else if base.is_absolute() {
        base
    } else {
        cwd.join(base)
    }
}

fn failed_fast<T: Display>(msg: T) -> ! {
    error!("{}", msg);
    exit(1)
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn main() {
    use Opt::*;
    let opt: Opt = Opt::from_args();
    init_logger(opt.plan_opt().verbose);
    let plan = opt.plan_opt().get_plan().unwrap_or_else(|e| failed_fast(e));
    let out_dir = opt.plan_opt().out_dir.clone();
    debug!("{} steps, base directory {:?}", plan.steps.len(), plan.base);
    match opt {
        Run { keep_going, dry_run, .. } => {
            if !dry_run {
                std::fs::create_dir_all(&out_dir)
                    .map_err(|source| BuildError::Write { path: out_dir.clone(), source })
                    .unwrap_or_else(|e| failed_fast(e));
            }
            let options = RunOptions { keep_going, dry_run };
            let report = runner::run(&plan, &out_dir, options).unwrap_or_else(|e| failed_fast(e));
            if report.succeeded() {
                info!("finished {} of {} steps", report.executed, plan.steps.len());
            } else {
                warn!("{} of {} steps failed", report.failures.len(), report.executed);
            }
        }
        Check { .. } => {
            let path = std::env::var_os("PATH");
            let issues = check::check(&plan, &out_dir, path.as_deref());
            for issue in &issues {
                error!("{}", issue);
            }
            if !issues.is_empty() {
                failed_fast(format!("{} problems found", issues.len()));
            }
            info!("all {} steps look runnable", plan.steps.len());
        }
        List { .. } => {
            for step in &plan.steps {
                info!("[{}] {}: {:?}", step.kind, step.description, step.outputs);
            }
        }
        Script { script_type, output, .. } => {
            let res = script::generate(&plan, script_type).unwrap_or_else(|e| failed_fast(e));
            match output {
                Some(output) => {
                    std::fs::write(&output, res)
                        .map_err(|source| BuildError::Write { path: output.clone(), source })
                        .unwrap_or_else(|e| failed_fast(e));
                    info!("successfully saved to {:?}", &output);
                }
                None => print!("{}", res),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_for(args: &[&str]) -> PathBuf {
        let opt = Opt::from_iter_safe(std::iter::once("buildit").chain(args.iter().copied())).unwrap();
        let plan = opt.plan_opt();
        resolve_base_dir(plan.base_dir.as_deref(), plan.plan.as_deref(), Path::new("/work"))
    }

    #[test]
    fn built_in_plan_uses_cwd() {
        assert_eq!(resolve_base_dir(None, None, Path::new("/work")), PathBuf::from("/work"));
    }

    #[test]
    fn plan_file_directory_is_the_default_base() {
        assert_eq!(
            resolve_base_dir(None, Some(Path::new("sub/p.json")), Path::new("/work")),
            PathBuf::from("/work/sub")
        );
        assert_eq!(
            resolve_base_dir(None, Some(Path::new("p.json")), Path::new("/work")),
            PathBuf::from("/work")
        );
        assert_eq!(
            resolve_base_dir(None, Some(Path::new("/srv/raptor/p.json")), Path::new("/work")),
            PathBuf::from("/srv/raptor")
        );
    }

    #[test]
    fn explicit_base_wins_and_is_made_absolute() {
        assert_eq!(
            resolve_base_dir(Some(Path::new("rel")), Some(Path::new("sub/p.json")), Path::new("/work")),
            PathBuf::from("/work/rel")
        );
        assert_eq!(
            resolve_base_dir(Some(Path::new("/opt/raptor")), None, Path::new("/work")),
            PathBuf::from("/opt/raptor")
        );
    }

    #[test]
    fn command_line_flags_reach_base_resolution() {
        assert_eq!(base_for(&["list", "-p", "sub/p.json"]), PathBuf::from("/work/sub"));
        assert_eq!(base_for(&["run", "-b", "rel", "-n"]), PathBuf::from("/work/rel"));
    }
}
