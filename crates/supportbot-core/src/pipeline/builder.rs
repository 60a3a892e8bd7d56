use std::future::Future;

use super::PipelineError;
use super::step::Step;

/// A sequence of steps that can be run as a whole.
pub trait Stage: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, PipelineError>> + Send;
}

pub struct First<S>(S);

impl<S: Step> Stage for First<S> {
    type Input = S::Input;
    type Output = S::Output;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        self.0.run(input).await
    }
}

pub struct Then<Prev, Next> {
    prev: Prev,
    next: Next,
}

impl<Prev, Next> Stage for Then<Prev, Next>
where
    Prev: Stage,
    Next: Step<Input = Prev::Output>,
{
    type Input = Prev::Input;
    type Output = Next::Output;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let intermediate = self.prev.run(input).await?;
        self.next.run(intermediate).await
    }
}

/// Type-checked chain of steps; each step's output feeds the next step's input.
pub struct Pipeline<S> {
    stages: S,
}

impl Pipeline<()> {
    #[must_use]
    pub fn start<S: Step>(step: S) -> Pipeline<First<S>> {
        Pipeline {
            stages: First(step),
        }
    }
}

impl<S> Pipeline<S> {
    #[must_use]
    pub fn step<T: Step>(self, step: T) -> Pipeline<Then<S, T>> {
        Pipeline {
            stages: Then {
                prev: self.stages,
                next: step,
            },
        }
    }
}

impl<S: Stage> Pipeline<S> {
    /// # Errors
    ///
    /// Returns the first `PipelineError` raised by any step; later steps do not run.
    pub async fn run(&self, input: S::Input) -> Result<S::Output, PipelineError> {
        self.stages.run(input).await
    }
}
