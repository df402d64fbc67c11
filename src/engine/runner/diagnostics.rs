use std::fmt::Write;

use crate::engine::{ExecutionTree, Status};

impl ExecutionTree {
    /// Renders the tree as a Mermaid diagram, color-coded by status.
    ///
    /// * **Green**: Success
    /// * **Grey**: Skipped
    /// * **Red**: Fail
    /// * **Yellow**: Interrupted (no result recorded)
    pub fn render_mermaid(&self) -> String {
        let mut f = String::new();
        writeln!(f, "graph TD").unwrap();

        for (_, id) in self.walk() {
            let node = &self[id];
            let name = node.name().to_string().replace('"', "\\\""); // Simple escape

            let (label_extra, color_code) = match node.status() {
                Some(Status::Success) => {
                    let duration = node
                        .duration()
                        .map(|duration| format!("{duration:.2?}"))
                        .unwrap_or_default();
                    (duration, "#86EFAC")
                }
                Some(Status::Skipped) => ("skipped".to_string(), "#D1D5DB"),
                Some(Status::Fail) => ("failed".to_string(), "#FCA5A5"),
                None => ("interrupted".to_string(), "#FDE68A"),
            };

            writeln!(f, "    {}[\"{}\\n{}\"]", id.index(), name, label_extra).unwrap();
            writeln!(f, "    style {} fill:{}", id.index(), color_code).unwrap();

            if let Some(parent) = node.parent() {
                writeln!(f, "    {} --> {}", parent.index(), id.index()).unwrap();
            }
        }

        f
    }
}

#[cfg(test)]
mod tests {
    use crate::{Migration, Task, TaskResult};

    #[test]
    fn test_render_mermaid() {
        let task: Task<()> = Task::composite("root")
            .subtask(Task::leaf("a").run(|_, _| Ok(TaskResult::success())))
            .subtask(Task::leaf("b").run(|_, _| Ok(TaskResult::skipped())))
            .build();

        let tree = Migration::default().run_once(&task, &()).unwrap();
        let mermaid = tree.render_mermaid();

        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("0 --> 1"));
        assert!(mermaid.contains("0 --> 2"));
        assert!(mermaid.contains("style 2 fill:#D1D5DB"));
    }
}
