use crate::error::{BuildError, Result};
use log::*;
use serde::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// An ordered list of build steps plus the variables their commands refer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Compile,
    Archive,
    Link,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            StepKind::Compile => "COMP",
            StepKind::Archive => "ARCH",
            StepKind::Link => "LINK",
        };
        f.write_str(tag)
    }
}

/// One step as written in a plan, before `{var}` expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    pub kind: StepKind,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPlan {
    pub base: PathBuf,
    pub steps: Vec<ResolvedStep>,
}

/// A step with every placeholder substituted. Relative paths are relative to
/// the output directory the runner works in.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStep {
    pub description: String,
    pub kind: StepKind,
    pub program: String,
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl ResolvedStep {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|x| x.to_string()).collect()
}

impl BuildPlan {
    /// The raptor library build: two compiles, one archive, one link.
    pub fn raptor() -> Self {
        let vars = [
            ("cxx", "mpicxx"),
            ("ar", "ar"),
            ("opt", "-O2"),
            ("std", "--std=c++11"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let steps = vec![
            Step {
                description: "Compiling raptor/core/ParVector.cpp".into(),
                kind: StepKind::Compile,
                program: "{cxx}".into(),
                args: strings(&[
                    "{opt}",
                    "{std}",
                    "-I{base}/external",
                    "{base}/raptor/core/ParVector.cpp",
                    "-c",
                    "-o",
                    "ParVector.cpp.1.o",
                ]),
                inputs: strings(&["{base}/raptor/core/ParVector.cpp"]),
                outputs: strings(&["ParVector.cpp.1.o"]),
            },
            Step {
                description: "Compiling examples/vecnorm.cpp".into(),
                kind: StepKind::Compile,
                program: "{cxx}".into(),
                args: strings(&[
                    "{opt}",
                    "{std}",
                    "-I{base}/external",
                    "-I{base}",
                    "{base}/examples/vecnorm.cpp",
                    "-c",
                    "-o",
                    "vecnorm.cpp.1.o",
                ]),
                inputs: strings(&["{base}/examples/vecnorm.cpp"]),
                outputs: strings(&["vecnorm.cpp.1.o"]),
            },
            Step {
                description: "Linking libraptor.a".into(),
                kind: StepKind::Archive,
                program: "{ar}".into(),
                args: strings(&["rcs", "libraptor.a", "ParVector.cpp.1.o"]),
                inputs: strings(&["ParVector.cpp.1.o"]),
                outputs: strings(&["libraptor.a"]),
            },
            Step {
                description: "Linking vecnorm".into(),
                kind: StepKind::Link,
                program: "{cxx}".into(),
                args: strings(&["vecnorm.cpp.1.o", "-o", "vecnorm", "-L.", "-lraptor"]),
                inputs: strings(&["vecnorm.cpp.1.o", "libraptor.a"]),
                outputs: strings(&["vecnorm"]),
            },
        ];
        BuildPlan { vars, steps }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut content = std::fs::read(path).map_err(|source| BuildError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;
        simd_json::serde::from_slice::<BuildPlan>(content.as_mut_slice()).map_err(|e| {
            BuildError::PlanParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    /// Substitutes `{var}` placeholders. `overrides` win over the plan's own
    /// variables; `base` is always the given base directory.
    pub fn resolve(&self, base: &Path, overrides: &[(String, String)]) -> Result<ResolvedPlan> {
        if overrides.iter().any(|(k, _)| k == "base") {
            warn!("ignoring define for `base`, set the base directory with --base-dir instead");
        }
        let mut vars = self.vars.clone();
        vars.extend(overrides.iter().cloned());
        vars.insert("base".into(), base.display().to_string());

        let expand_all = |items: &[String]| -> Result<Vec<String>> {
            items.iter().map(|x| expand(x, &vars)).collect()
        };
        let steps = self
            .steps
            .iter()
            .map(|step| -> Result<ResolvedStep> {
                Ok(ResolvedStep {
                    description: step.description.clone(),
                    kind: step.kind,
                    program: expand(&step.program, &vars)?,
                    args: expand_all(&step.args)?,
                    inputs: expand_all(&step.inputs)?.into_iter().map(PathBuf::from).collect(),
                    outputs: expand_all(&step.outputs)?.into_iter().map(PathBuf::from).collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedPlan {
            base: base.to_path_buf(),
            steps,
        })
    }
}

/// Parses a `KEY=VALUE` command line define.
pub fn parse_define(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(BuildError::MalformedDefine(s.to_string())),
    }
}

/// Expands `{name}` from `vars`; `{{` and `}}` stand for literal braces.
pub fn expand(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let unbalanced = || BuildError::UnbalancedBrace {
        context: template.to_string(),
    };
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(unbalanced()),
                        Some(c) => name.push(c),
                    }
                }
                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(BuildError::UnknownVariable {
                            name,
                            context: template.to_string(),
                        })
                    }
                }
            }
            '}' => return Err(unbalanced()),
            c => out.push(c),
        }
    }
    Ok(out)
}
