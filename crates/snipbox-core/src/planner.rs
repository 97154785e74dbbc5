//! Execution planning
//!
//! Turns a profile and the inferred dependency list into an ordered list of
//! typed stages. Nothing here touches the filesystem, the network or a shell;
//! the launcher serializes the plan into a container command at the very end.

use crate::registry::LanguageProfile;
use serde::Serialize;

/// A program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits an argument vector into program and arguments. Empty vectors have no program.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    CreateEnvironment { command: CommandLine },
    Install {
        command: CommandLine,
        packages: Vec<String>,
    },
    Run { command: CommandLine },
    Teardown { command: CommandLine },
}

impl Stage {
    pub fn command(&self) -> &CommandLine {
        match self {
            Stage::CreateEnvironment { command }
            | Stage::Install { command, .. }
            | Stage::Run { command }
            | Stage::Teardown { command } => command,
        }
    }

    pub fn is_teardown(&self) -> bool {
        matches!(self, Stage::Teardown { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::CreateEnvironment { .. } => "create_environment",
            Stage::Install { .. } => "install",
            Stage::Run { .. } => "run",
            Stage::Teardown { .. } => "teardown",
        }
    }
}

/// Ordered stages for one request. Built only by [`plan`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    stages: Vec<Stage>,
}

impl ExecutionPlan {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_single_stage(&self) -> bool {
        self.stages.len() == 1
    }

    pub fn install_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| matches!(stage, Stage::Install { .. }))
    }

    pub fn run_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| matches!(stage, Stage::Run { .. }))
    }
}

/// Plans the stages needed to provision `dependencies` and run the entry file.
pub fn plan(profile: &LanguageProfile, dependencies: &[String]) -> ExecutionPlan {
    let mut stages = Vec::with_capacity(4);

    if let Some(env) = &profile.isolated_environment {
        if let Some(command) = CommandLine::from_argv(&env.create) {
            stages.push(Stage::CreateEnvironment { command });
        }
    }

    if let Some(install) = &profile.dependency_install_command {
        if !dependencies.is_empty() {
            let mut packages: Vec<String> = Vec::with_capacity(dependencies.len());
            for module in dependencies {
                let package = profile.package_for(module);
                if !packages.iter().any(|known| known == package) {
                    packages.push(package.to_string());
                }
            }
            let mut argv = install.clone();
            argv.extend(packages.iter().cloned());
            if let Some(command) = CommandLine::from_argv(&argv) {
                stages.push(Stage::Install { command, packages });
            }
        }
    }

    if let Some(command) = CommandLine::from_argv(&profile.run_argv()) {
        stages.push(Stage::Run { command });
    }

    if let Some(env) = &profile.isolated_environment {
        if let Some(command) = CommandLine::from_argv(&env.teardown) {
            stages.push(Stage::Teardown { command });
        }
    }

    log::debug!(
        "Planned {} stage(s) for '{}': {}",
        stages.len(),
        profile.language_id,
        stages.iter().map(Stage::name).collect::<Vec<_>>().join(", ")
    );

    ExecutionPlan { stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageRegistry;

    fn profile(language: &str) -> LanguageProfile {
        LanguageRegistry::builtin()
            .unwrap()
            .get(language)
            .cloned()
            .unwrap()
    }

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_javascript_without_dependencies_is_single_run_stage() {
        let plan = plan(&profile("javascript"), &[]);
        assert!(plan.is_single_stage());
        assert_eq!(
            plan.stages()[0],
            Stage::Run {
                command: CommandLine::new("node", deps(&["code_to_run.js"]))
            }
        );
    }

    #[test]
    fn test_javascript_dependencies_install_before_run() {
        let plan = plan(&profile("javascript"), &deps(&["axios", "lodash"]));
        let names: Vec<&str> = plan.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["install", "run"]);
        match &plan.stages()[0] {
            Stage::Install { command, packages } => {
                assert_eq!(command.program, "npm");
                assert_eq!(
                    command.args,
                    deps(&["install", "--no-audit", "--no-fund", "axios", "lodash"])
                );
                assert_eq!(packages, &deps(&["axios", "lodash"]));
            }
            other => panic!("expected install stage, got {:?}", other),
        }
    }

    #[test]
    fn test_javascript_subpath_imports_install_package_roots() {
        let source = "const fp = require('lodash/fp');\n\
                      const _ = require('lodash');\n\
                      const fs = require('node:fs');\n\
                      const sub = require('@scope/pkg/sub');\n";
        let profile = profile("javascript");
        let dependencies = crate::extract::extract_dependencies(source, &profile);
        assert_eq!(dependencies, deps(&["@scope/pkg/sub", "lodash", "lodash/fp"]));

        let plan = plan(&profile, &dependencies);
        match plan.install_stage().unwrap() {
            Stage::Install { command, packages } => {
                assert_eq!(packages, &deps(&["@scope/pkg", "lodash"]));
                assert_eq!(
                    command.args,
                    deps(&["install", "--no-audit", "--no-fund", "@scope/pkg", "lodash"])
                );
            }
            other => panic!("expected install stage, got {:?}", other),
        }
    }

    #[test]
    fn test_python_wraps_run_in_throwaway_environment() {
        let plan = plan(&profile("python"), &[]);
        let names: Vec<&str> = plan.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["create_environment", "run", "teardown"]);
        assert!(plan.install_stage().is_none());
        assert!(plan.stages().last().unwrap().is_teardown());
    }

    #[test]
    fn test_python_import_plans_install_stage_before_run() {
        let plan = plan(&profile("python"), &deps(&["requests"]));
        let names: Vec<&str> = plan.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["create_environment", "install", "run", "teardown"]);
        assert_eq!(
            plan.install_stage().unwrap().command().argv(),
            deps(&["/app/venv/bin/pip", "install", "-q", "requests"])
        );
        assert_eq!(
            plan.run_stage().unwrap().command().argv(),
            deps(&["/app/venv/bin/python", "code_to_run.py"])
        );
    }

    #[test]
    fn test_python_aliases_apply_to_install_stage() {
        let plan = plan(&profile("python"), &deps(&["cv2", "requests", "sklearn"]));
        match plan.install_stage().unwrap() {
            Stage::Install { packages, .. } => {
                assert_eq!(packages, &deps(&["opencv-python", "requests", "scikit-learn"]));
            }
            other => panic!("expected install stage, got {:?}", other),
        }
    }

    #[test]
    fn test_bash_ignores_dependencies() {
        let plan = plan(&profile("bash"), &deps(&["jq"]));
        assert!(plan.is_single_stage());
        assert_eq!(
            plan.run_stage().unwrap().command().argv(),
            deps(&["bash", "code_to_run.sh"])
        );
    }

    #[test]
    fn test_plan_serializes_with_stage_tags() {
        let plan = plan(&profile("bash"), &[]);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["stages"][0]["stage"], "run");
        assert_eq!(json["stages"][0]["command"]["program"], "bash");
    }
}
