use crate::{Experiment, ExperimentResult};

/// Receives experiment exposures so they can be forwarded to your analytics pipeline.
///
/// The callback is carried in the [`Context`](crate::Context) and invoked by the evaluator, on the
/// thread that evaluated the feature or experiment, whenever a subject is bucketed into an
/// experiment.
pub trait TrackingCallback: Send + Sync {
    fn on_experiment_viewed(&self, experiment: &Experiment, result: &ExperimentResult);
}

pub(crate) struct NoopTrackingCallback;
impl TrackingCallback for NoopTrackingCallback {
    fn on_experiment_viewed(&self, _experiment: &Experiment, _result: &ExperimentResult) {}
}

impl<T: Fn(&Experiment, &ExperimentResult) + Send + Sync> TrackingCallback for T {
    fn on_experiment_viewed(&self, experiment: &Experiment, result: &ExperimentResult) {
        self(experiment, result);
    }
}
