//! Stage definition.

/// Named group of tasks, executed in order.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub name: &'static str,
    pub tasks: Vec<T>,
}

impl<T> Stage<T> {
    pub fn new(name: &'static str, tasks: Vec<T>) -> Self {
        Self { name, tasks }
    }

    pub fn single(name: &'static str, task: T) -> Self {
        Self::new(name, vec![task])
    }
}
