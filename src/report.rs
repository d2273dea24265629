use std::fmt::Display;
use std::time::Duration;

use camino::Utf8PathBuf;
use console::style;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { outputs: Vec<Utf8PathBuf> },
    Failed { reason: String },
    /// Not run because a prerequisite failed or was itself skipped.
    Skipped { prerequisite: String },
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Outcome of every task that took part in a build, in execution order.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub tasks: Vec<TaskReport>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| matches!(task.outcome, Outcome::Succeeded { .. }))
    }

    pub fn get(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|task| !matches!(task.outcome, Outcome::Succeeded { .. }))
    }

    pub(crate) fn push(&mut self, name: &str, outcome: Outcome, duration: Duration) {
        self.tasks.push(TaskReport {
            name: name.to_string(),
            outcome,
            duration,
        });
    }
}

impl Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for task in &self.tasks {
            match &task.outcome {
                Outcome::Succeeded { outputs } => writeln!(
                    f,
                    "{} {} ({} files, {:.2?})",
                    style("ok").green(),
                    task.name,
                    outputs.len(),
                    task.duration
                )?,
                Outcome::Failed { reason } => {
                    writeln!(f, "{} {}: {reason}", style("failed").red(), task.name)?
                }
                Outcome::Skipped { prerequisite } => writeln!(
                    f,
                    "{} {} (prerequisite '{prerequisite}' did not succeed)",
                    style("skipped").yellow(),
                    task.name
                )?,
            }
        }

        Ok(())
    }
}
