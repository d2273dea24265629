use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::core::Notification;
use crate::error::ConfigError;
use crate::transform::Transform;

/// A named unit of work: a transform invocation plus the tasks that must
/// finish before it may start.
pub struct Task {
    name: String,
    prerequisites: Vec<String>,
    action: Arc<dyn Transform>,
    notify: Option<Notification>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn action(&self) -> &dyn Transform {
        self.action.as_ref()
    }

    pub fn notification(&self) -> Option<Notification> {
        self.notify
    }

    /// Signal sent to live-reload clients whenever this task succeeds.
    pub fn notify(&mut self, notification: Notification) -> &mut Self {
        self.notify = Some(notification);
        self
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("notify", &self.notify)
            .finish_non_exhaustive()
    }
}

/// Registry of tasks and their prerequisites.
///
/// Tasks are kept in registration order. That order carries no meaning for
/// scheduling, it only makes stages print and test deterministically.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task. Prerequisites may refer to tasks registered later, they
    /// are checked by [`TaskGraph::finalize`].
    pub fn register<I, S>(
        &mut self,
        name: impl Into<String>,
        prerequisites: I,
        action: impl Transform + 'static,
    ) -> Result<&mut Task, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ConfigError::DuplicateTask(name));
        }

        let id = self.tasks.len();
        self.index.insert(name.clone(), id);
        self.tasks.push(Task {
            name,
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
            action: Arc::new(action),
            notify: None,
        });

        Ok(&mut self.tasks[id])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&id| &self.tasks[id])
    }

    pub(crate) fn id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn task(&self, id: usize) -> &Task {
        &self.tasks[id]
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Checks that every prerequisite names a registered task.
    pub fn finalize(&self) -> Result<(), ConfigError> {
        for task in &self.tasks {
            for prerequisite in &task.prerequisites {
                if !self.index.contains_key(prerequisite) {
                    return Err(ConfigError::UnknownPrerequisite {
                        task: task.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Groups the tasks into stages. Every task lands in exactly one stage,
    /// strictly after the stages of all its prerequisites. Tasks sharing a
    /// stage are independent of each other and may run concurrently.
    pub fn resolve_order(&self) -> Result<Vec<Vec<&str>>, ConfigError> {
        Ok(self
            .stages()?
            .into_iter()
            .map(|stage| stage.into_iter().map(|id| self.tasks[id].name()).collect())
            .collect())
    }

    /// Same as [`TaskGraph::resolve_order`], in terms of task ids.
    pub(crate) fn stages(&self) -> Result<Vec<Vec<usize>>, ConfigError> {
        self.finalize()?;

        let mut graph = Graph::<usize, ()>::with_capacity(self.tasks.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.tasks.len()).map(|id| graph.add_node(id)).collect();

        for (id, task) in self.tasks.iter().enumerate() {
            for prerequisite in &task.prerequisites {
                graph.add_edge(nodes[self.index[prerequisite]], nodes[id], ());
            }
        }

        let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()];
            ConfigError::CyclicDependency(self.tasks[id].name.clone())
        })?;

        // A task's stage is the length of the longest prerequisite chain
        // leading to it.
        let mut level = vec![0usize; self.tasks.len()];
        for node in order {
            let id = graph[node];
            level[id] = graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .map(|dep| level[graph[dep]] + 1)
                .max()
                .unwrap_or(0);
        }

        let depth = level.iter().max().map_or(0, |max| max + 1);
        let mut stages = vec![Vec::new(); depth];
        for (id, &stage) in level.iter().enumerate() {
            stages[stage].push(id);
        }

        Ok(stages)
    }
}
