use super::error::StageError;
use super::record::Record;

/// One unit of work in the task graph.
///
/// `run` sees a frozen snapshot of the shared record and returns the fields
/// it contributes. When `run` fails or panics, `fallback` supplies the
/// degraded contribution instead.
pub trait Stage<V>: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, input: &Record<V>) -> Result<Record<V>, StageError>;

    fn fallback(&self, _input: &Record<V>, _error: &StageError) -> Record<V> {
        Record::new()
    }
}

/// A stage backed by a closure, with an empty fallback.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<V, F> Stage<V> for FnStage<F>
where
    F: Fn(&Record<V>) -> Result<Record<V>, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, input: &Record<V>) -> Result<Record<V>, StageError> {
        (self.f)(input)
    }
}
