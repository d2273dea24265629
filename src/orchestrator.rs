//! Executes the task graph stage by stage.
//!
//! Stages run strictly one after another, the tasks of a single stage run
//! concurrently on the rayon pool. A failing task never takes its siblings
//! down: its failure is recorded in the [`BuildReport`], tasks depending on
//! it are skipped, and everything else carries on.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cache::Cache;
use crate::core::{Environment, Mode, Notification};
use crate::error::{BuildError, ConfigError, TaskError};
use crate::graph::TaskGraph;
use crate::report::{BuildReport, Outcome};
use crate::transform::Invocation;

pub struct Orchestrator {
    graph: TaskGraph,
    stages: Vec<Vec<usize>>,
    cache: Cache,
    mode: Mode,
    live_port: Option<u16>,
    notifier: Option<Sender<Notification>>,
}

impl Orchestrator {
    /// Takes ownership of the graph and resolves its stages once. The graph
    /// can't change afterwards.
    pub fn new(graph: TaskGraph, cache: Cache) -> Result<Self, ConfigError> {
        let stages = graph.stages()?;

        Ok(Self {
            graph,
            stages,
            cache,
            mode: Mode::default(),
            live_port: None,
            notifier: None,
        })
    }

    /// Completion notifications of successful tasks go to this channel.
    pub fn with_notifier(mut self, notifier: Sender<Notification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Mode used by [`Orchestrator::run`].
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Port of the live-reload socket, exposed to transforms so pages can
    /// connect to it.
    pub fn with_live_port(mut self, port: u16) -> Self {
        self.live_port = Some(port);
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn environment(&self, mode: Mode) -> Environment {
        Environment {
            mode,
            live_port: self.live_port,
        }
    }

    /// Runs every task of the graph.
    pub fn build(&self, mode: Mode) -> Result<BuildReport, BuildError> {
        tracing::info!("building in {mode} mode");
        let env = self.environment(mode);
        Ok(self.execute(&self.stages, &env, None))
    }

    /// Runs exactly the named tasks, in stage order. Prerequisites outside
    /// of the named set are assumed to be satisfied by an earlier build.
    pub fn run<S>(&self, tasks: &[S], changed: &[Utf8PathBuf]) -> Result<BuildReport, BuildError>
    where
        S: AsRef<str>,
    {
        let mut wanted = HashSet::new();
        for name in tasks {
            let name = name.as_ref();
            let id = self
                .graph
                .id(name)
                .ok_or_else(|| BuildError::UnknownTask(name.to_string()))?;
            wanted.insert(id);
        }

        let stages: Vec<Vec<usize>> = self
            .stages
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .copied()
                    .filter(|id| wanted.contains(id))
                    .collect::<Vec<_>>()
            })
            .filter(|stage| !stage.is_empty())
            .collect();

        let env = self.environment(self.mode);
        Ok(self.execute(&stages, &env, Some(changed)))
    }

    fn execute(
        &self,
        stages: &[Vec<usize>],
        env: &Environment,
        changed: Option<&[Utf8PathBuf]>,
    ) -> BuildReport {
        let mut report = BuildReport::default();
        let total = stages.iter().map(Vec::len).sum::<usize>();
        if total == 0 {
            return report;
        }

        let root_span = tracing::span!(Level::INFO, "build");
        root_span.pb_set_length(total as u64);
        root_span.pb_set_style(&crate::io::style_stage());
        root_span.pb_set_message("Running tasks...");
        let _enter = root_span.enter();

        let s = Instant::now();
        let invocation = Invocation {
            env,
            cache: &self.cache,
            changed,
        };

        // true once a task succeeded, false if it failed or was skipped
        let mut succeeded: HashMap<usize, bool> = HashMap::new();

        for stage in stages {
            let mut runnable = Vec::with_capacity(stage.len());

            for &id in stage {
                let task = self.graph.task(id);
                let blocker = task.prerequisites().iter().find(|name| {
                    self.graph
                        .id(name)
                        .is_some_and(|dep| succeeded.get(&dep) == Some(&false))
                });

                match blocker {
                    Some(prerequisite) => {
                        tracing::warn!(
                            "skipping {}, prerequisite {prerequisite} did not succeed",
                            task.name()
                        );
                        succeeded.insert(id, false);
                        root_span.pb_inc(1);
                        report.push(
                            task.name(),
                            Outcome::Skipped {
                                prerequisite: prerequisite.clone(),
                            },
                            Duration::ZERO,
                        );
                    }
                    None => runnable.push(id),
                }
            }

            // The whole stage finishes before the next one starts.
            let results: Vec<_> = runnable
                .par_iter()
                .map(|&id| (id, self.run_task(id, &invocation)))
                .collect();

            for (id, (outcome, duration)) in results {
                succeeded.insert(id, matches!(outcome, Outcome::Succeeded { .. }));
                root_span.pb_inc(1);
                report.push(self.graph.task(id).name(), outcome, duration);
            }
        }

        if report.is_success() {
            tracing::info!("build finished {}", crate::io::as_overhead(s));
        } else {
            let failed = report.failed().count();
            tracing::error!(
                "build finished with {failed} unsuccessful task(s) {}",
                crate::io::as_overhead(s)
            );
        }

        report
    }

    fn run_task(&self, id: usize, invocation: &Invocation) -> (Outcome, Duration) {
        let task = self.graph.task(id);

        let span = tracing::span!(Level::INFO, "task", name = task.name());
        span.pb_set_style(&crate::io::style_task());
        span.pb_set_message(&format!("Running {}", task.name()));
        let _enter = span.enter();

        let start = Instant::now();

        // A panicking transform only sees shared, immutable state, so it
        // can't leave anything half-updated for its siblings.
        let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.action().run(invocation)
        })) {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panic(panic_message(panic))),
        };

        let duration = start.elapsed();

        let outcome = match result {
            Ok(outputs) => {
                tracing::info!(
                    "finished {} ({} files) {}",
                    task.name(),
                    outputs.len(),
                    crate::io::as_overhead(start)
                );

                if let (Some(notification), Some(notifier)) = (task.notification(), &self.notifier)
                {
                    // nobody listening is fine
                    let _ = notifier.send(notification);
                }

                Outcome::Succeeded { outputs }
            }
            Err(err) => {
                tracing::error!("{} failed: {err}", task.name());
                Outcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        (outcome, duration)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown payload")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Mutex};
    use std::thread::sleep;

    use camino::Utf8Path;

    use super::*;
    use crate::error::TransformError;
    use crate::transform::Produced;

    type Log = Arc<Mutex<Vec<String>>>;

    fn action<F>(f: F) -> F
    where
        F: Fn(&Invocation) -> Result<Produced, TaskError> + Send + Sync + 'static,
    {
        f
    }

    fn ok_writing(log: Log, name: &'static str, out: Utf8PathBuf) -> impl crate::Transform {
        action(move |_| {
            log.lock().unwrap().push(format!("write:{name}"));
            crate::io::write(&out, name)?;
            Ok(vec![out.clone()])
        })
    }

    fn failing(message: &'static str) -> impl crate::Transform {
        action(move |_| Err(TransformError::Esbuild(message.to_string()).into()))
    }

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    fn orchestrator(graph: TaskGraph, root: &Utf8Path) -> Orchestrator {
        Orchestrator::new(graph, Cache::new(root.join(".cache"))).unwrap()
    }

    #[test]
    fn test_clean_completes_before_any_write() {
        let (_dir, root) = tempdir();
        let dist = root.join("dist");
        let log: Log = Default::default();

        let mut graph = TaskGraph::new();
        {
            let log = log.clone();
            let dist = dist.clone();
            graph
                .register(
                    "clean",
                    Vec::<String>::new(),
                    action(move |_| {
                        // slow clean, a racing writer would get ahead of it
                        sleep(Duration::from_millis(50));
                        crate::io::clean(&dist)?;
                        log.lock().unwrap().push("clean:done".into());
                        Ok(vec![])
                    }),
                )
                .unwrap();
        }

        for name in ["html:build", "js:build", "style:build", "fonts:build", "image:build"] {
            let out = dist.join(name.replace(':', "_"));
            graph.register(name, ["clean"], ok_writing(log.clone(), name, out)).unwrap();
        }

        let report = orchestrator(graph, &root).build(Mode::Production).unwrap();
        assert!(report.is_success());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 6);
        assert_eq!(log[0], "clean:done");

        // nothing written got wiped by clean
        for name in ["html_build", "js_build", "style_build", "fonts_build", "image_build"] {
            assert!(dist.join(name).is_file());
        }
    }

    #[test]
    fn test_failure_does_not_stop_siblings() {
        let (_dir, root) = tempdir();
        let log: Log = Default::default();

        let mut graph = TaskGraph::new();
        graph
            .register("clean", Vec::<String>::new(), action(|_| Ok(vec![])))
            .unwrap();
        graph
            .register("style:build", ["clean"], failing("unexpected '}'"))
            .unwrap();
        graph
            .register(
                "js:build",
                ["clean"],
                ok_writing(log.clone(), "js:build", root.join("dist/js/main.js")),
            )
            .unwrap();

        let report = orchestrator(graph, &root).build(Mode::Development).unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            &report.get("style:build").unwrap().outcome,
            Outcome::Failed { reason } if reason.contains("unexpected '}'")
        ));
        assert!(matches!(
            report.get("js:build").unwrap().outcome,
            Outcome::Succeeded { .. }
        ));
        assert!(root.join("dist/js/main.js").is_file());
    }

    #[test]
    fn test_dependents_of_failed_task_are_skipped() {
        let (_dir, root) = tempdir();
        let ran: Log = Default::default();

        let mut graph = TaskGraph::new();
        graph.register("a", Vec::<String>::new(), failing("boom")).unwrap();
        graph
            .register("b", Vec::<String>::new(), action(|_| Ok(vec![])))
            .unwrap();
        graph
            .register("c", ["a"], ok_writing(ran.clone(), "c", root.join("c")))
            .unwrap();
        graph
            .register("d", ["c"], ok_writing(ran.clone(), "d", root.join("d")))
            .unwrap();
        graph
            .register("e", ["b"], ok_writing(ran.clone(), "e", root.join("e")))
            .unwrap();

        let report = orchestrator(graph, &root).build(Mode::Development).unwrap();

        assert_eq!(
            report.get("c").unwrap().outcome,
            Outcome::Skipped {
                prerequisite: "a".into()
            }
        );
        assert_eq!(
            report.get("d").unwrap().outcome,
            Outcome::Skipped {
                prerequisite: "c".into()
            }
        );
        assert!(matches!(
            report.get("e").unwrap().outcome,
            Outcome::Succeeded { .. }
        ));
        assert_eq!(*ran.lock().unwrap(), vec!["write:e".to_string()]);
        assert_eq!(report.failed().count(), 3);
    }

    #[test]
    fn test_notifications_only_for_successful_tasks() {
        let (_dir, root) = tempdir();
        let (tx, rx) = channel();

        let mut graph = TaskGraph::new();
        graph
            .register("html:build", Vec::<String>::new(), action(|_| Ok(vec![])))
            .unwrap()
            .notify(Notification::Reload);
        graph
            .register("style:build", Vec::<String>::new(), failing("bad scss"))
            .unwrap()
            .notify(Notification::Refresh);
        graph
            .register("fonts:build", Vec::<String>::new(), action(|_| Ok(vec![])))
            .unwrap();

        let orchestrator = orchestrator(graph, &root).with_notifier(tx);
        orchestrator.build(Mode::Development).unwrap();
        drop(orchestrator);

        let received: Vec<_> = rx.iter().collect();
        assert_eq!(received, vec![Notification::Reload]);
    }

    #[test]
    fn test_run_subset_skips_clean() {
        let (_dir, root) = tempdir();
        let log: Log = Default::default();

        let mut graph = TaskGraph::new();
        {
            let log = log.clone();
            graph
                .register(
                    "clean",
                    Vec::<String>::new(),
                    action(move |_| {
                        log.lock().unwrap().push("clean".into());
                        Ok(vec![])
                    }),
                )
                .unwrap();
        }
        {
            let log = log.clone();
            graph
                .register(
                    "image:build",
                    ["clean"],
                    action(move |invocation| {
                        let changed = invocation.changed.unwrap_or_default();
                        log.lock().unwrap().push(format!("image:{}", changed.len()));
                        Ok(vec![])
                    }),
                )
                .unwrap();
        }

        let orchestrator = orchestrator(graph, &root);
        let changed = vec![Utf8PathBuf::from("src/img/a.png")];
        let report = orchestrator.run(&["image:build"], &changed).unwrap();

        assert!(report.is_success());
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["image:1".to_string()]);

        assert!(matches!(
            orchestrator.run(&["nope"], &[]),
            Err(BuildError::UnknownTask(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_panic_is_a_failure() {
        let (_dir, root) = tempdir();

        let mut graph = TaskGraph::new();
        graph
            .register(
                "fonts:build",
                Vec::<String>::new(),
                action(|_| panic!("font table corrupted")),
            )
            .unwrap();

        let report = orchestrator(graph, &root).build(Mode::Development).unwrap();
        assert!(matches!(
            &report.get("fonts:build").unwrap().outcome,
            Outcome::Failed { reason } if reason.contains("font table corrupted")
        ));
    }

    #[test]
    fn test_cycle_rejected_before_build() {
        let (_dir, root) = tempdir();

        let mut graph = TaskGraph::new();
        graph.register("a", ["b"], action(|_| Ok(vec![]))).unwrap();
        graph.register("b", ["a"], action(|_| Ok(vec![]))).unwrap();

        assert!(matches!(
            Orchestrator::new(graph, Cache::new(root.join(".cache"))),
            Err(ConfigError::CyclicDependency(_))
        ));
    }
}
