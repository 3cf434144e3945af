use crate::plan::{ResolvedPlan, ResolvedStep};
use std::str::FromStr;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ScriptType {
    Sh,
    Json,
}

impl FromStr for ScriptType {
    type Err = std::io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sh" => Ok(ScriptType::Sh),
            "json" => Ok(ScriptType::Json),
            _ => Err(std::io::Error::new(std::io::ErrorKind::InvalidInput,
                                         "no such script type"))
        }
    }
}

macro_rules! template {
    (Header) => {
r#"#!/bin/sh
# generated by buildit, base directory {}
set -e
"#
    };
    (Step) => {
r#"
# [{}/{}] {}
{}
"#
    };
}

pub fn generate(plan: &ResolvedPlan, script_type: ScriptType) -> serde_json::Result<String> {
    match script_type {
        ScriptType::Sh => Ok(generate_sh(plan)),
        ScriptType::Json => serde_json::to_string_pretty(plan).map(|x| x + "\n"),
    }
}

pub fn generate_sh(plan: &ResolvedPlan) -> String {
    let total = plan.steps.len();
    let mut script = format!(template!(Header), plan.base.display());
    script.extend(plan.steps.iter().enumerate().map(|(i, step): (usize, &ResolvedStep)| {
        format!(template!(Step), i + 1, total, step.description, shell_command(step))
    }));
    script
}

fn shell_command(step: &ResolvedStep) -> String {
    std::iter::once(&step.program)
        .chain(step.args.iter())
        .map(|x| quote(x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quotes `arg` for a POSIX shell, leaving plain words untouched.
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=+,:@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BuildPlan;
    use std::path::Path;

    #[test]
    fn parses_script_types() {
        assert_eq!("sh".parse::<ScriptType>().unwrap(), ScriptType::Sh);
        assert_eq!("json".parse::<ScriptType>().unwrap(), ScriptType::Json);
        assert!("ninja".parse::<ScriptType>().is_err());
    }

    #[test]
    fn quotes_only_what_needs_it() {
        assert_eq!(quote("--std=c++11"), "--std=c++11");
        assert_eq!(quote("-I/opt/raptor/external"), "-I/opt/raptor/external");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn sh_script_lists_every_step() {
        let plan = BuildPlan::raptor().resolve(Path::new("/opt/raptor"), &[]).unwrap();
        let script = generate(&plan, ScriptType::Sh).unwrap();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("set -e\n"));
        assert!(script.contains("# [3/4] Linking libraptor.a\nar rcs libraptor.a ParVector.cpp.1.o\n"));
        assert!(script.contains("\nmpicxx vecnorm.cpp.1.o -o vecnorm -L. -lraptor\n"));
        assert_eq!(script.matches("# [").count(), 4);
    }

    #[test]
    fn json_dump_carries_resolved_values() {
        let plan = BuildPlan::raptor().resolve(Path::new("/opt/raptor"), &[]).unwrap();
        let dump: serde_json::Value = serde_json::from_str(&generate(&plan, ScriptType::Json).unwrap()).unwrap();
        assert_eq!(dump["base"], "/opt/raptor");
        assert_eq!(dump["steps"][0]["kind"], "compile");
        assert_eq!(dump["steps"][3]["outputs"][0], "vecnorm");
        assert_eq!(dump["steps"][1]["args"][3], "-I/opt/raptor");
    }
}
