use std::future::Future;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::record::ImageRecord;

/// Numeric progress target, such as a progress bar.
pub trait ProgressBar {
    /// Called once with the number of records before the first group.
    fn set_max(&mut self, max: usize);
    /// Called after each group with the cumulative processed count.
    fn set_value(&mut self, value: usize);
}

/// Text progress target receiving a percentage such as `"40%"`.
pub trait ProgressLabel {
    /// Replace the displayed text.
    fn set_text(&mut self, text: &str);
}

/// Optional progress targets for one batch pass.
#[derive(Default)]
pub struct Progress<'a> {
    bar: Option<&'a mut dyn ProgressBar>,
    label: Option<&'a mut dyn ProgressLabel>,
}

impl<'a> Progress<'a> {
    /// No progress reporting.
    pub fn none() -> Self {
        Self::default()
    }

    /// Report counts to `bar`.
    pub fn bar(mut self, bar: &'a mut dyn ProgressBar) -> Self {
        self.bar = Some(bar);
        self
    }

    /// Report percentages to `label`.
    pub fn label(mut self, label: &'a mut dyn ProgressLabel) -> Self {
        self.label = Some(label);
        self
    }

    fn start(&mut self, total: usize) {
        if let Some(bar) = self.bar.as_deref_mut() {
            bar.set_max(total);
        }
    }

    fn update(&mut self, processed: usize, total: usize) {
        if let Some(bar) = self.bar.as_deref_mut() {
            bar.set_value(processed);
        }
        if let Some(label) = self.label.as_deref_mut() {
            label.set_text(&percent_text(processed, total));
        }
    }
}

/// Rounded percentage of `processed` over `total`, e.g. `"67%"`.
///
/// An empty batch counts as complete.
pub fn percent_text(processed: usize, total: usize) -> String {
    if total == 0 {
        return "100%".to_string();
    }
    format!("{}%", (processed as f64 / total as f64 * 100.0).round() as u64)
}

/// Hands control back to the host between groups.
#[async_trait(?Send)]
pub trait FrameYield {
    /// Resolve once the host had a chance to render and handle events.
    async fn next_frame(&self);
}

/// Yields to the executor once per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldNow;

#[async_trait(?Send)]
impl FrameYield for YieldNow {
    async fn next_frame(&self) {
        tokio::task::yield_now().await;
    }
}

/// Run `process` over `records` in groups of `group_size`.
///
/// Items within a group are polled concurrently on the current task and the
/// group completes only once every item has. Progress is reported after each
/// group, then `frames` yields to the host before the next group starts.
/// `process` receives each record and its index in `records`; it must
/// contain its own failures.
pub async fn process_in_groups<'r, F, Fut>(
    records: &'r mut [ImageRecord],
    group_size: usize,
    progress: &mut Progress<'_>,
    frames: &dyn FrameYield,
    mut process: F,
) where
    F: FnMut(&'r mut ImageRecord, usize) -> Fut,
    Fut: Future<Output = ()> + 'r,
{
    let total = records.len();
    let group_size = group_size.max(1);
    progress.start(total);

    let mut processed = 0;
    for (group_index, group) in records.chunks_mut(group_size).enumerate() {
        let base = group_index * group_size;
        let len = group.len();

        join_all(
            group
                .iter_mut()
                .enumerate()
                .map(|(offset, record)| process(record, base + offset)),
        )
        .await;

        processed = (processed + len).min(total);
        debug!(group = group_index, processed, total, "group finished");
        progress.update(processed, total);

        frames.next_frame().await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::intake::SourceImage;

    #[derive(Default)]
    struct RecordingBar {
        max: Option<usize>,
        values: Vec<usize>,
    }

    impl ProgressBar for RecordingBar {
        fn set_max(&mut self, max: usize) {
            self.max = Some(max);
        }

        fn set_value(&mut self, value: usize) {
            self.values.push(value);
        }
    }

    #[derive(Default)]
    struct RecordingLabel(Vec<String>);

    impl ProgressLabel for RecordingLabel {
        fn set_text(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
    }

    #[derive(Default)]
    struct CountingFrames(Cell<usize>);

    #[async_trait(?Send)]
    impl FrameYield for CountingFrames {
        async fn next_frame(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn records(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| ImageRecord::new(SourceImage::new(format!("{i}.jpg"), "image/jpeg", vec![])))
            .collect()
    }

    #[tokio::test]
    async fn progress_is_reported_per_group() {
        let mut items = records(12);
        let mut bar = RecordingBar::default();
        let mut label = RecordingLabel::default();
        let frames = CountingFrames::default();
        let mut progress = Progress::none().bar(&mut bar).label(&mut label);

        process_in_groups(&mut items, 5, &mut progress, &frames, |_, _| async {}).await;

        assert_eq!(bar.max, Some(12));
        assert_eq!(bar.values, vec![5, 10, 12]);
        assert_eq!(label.0, vec!["42%", "83%", "100%"]);
        assert_eq!(frames.0.get(), 3);
    }

    #[tokio::test]
    async fn every_record_is_visited_with_its_index() {
        let mut items = records(7);
        let seen = RefCell::new(Vec::new());

        process_in_groups(&mut items, 3, &mut Progress::none(), &YieldNow, |record, index| {
            record.failed = index % 2 == 0;
            seen.borrow_mut().push(index);
            async {}
        })
        .await;

        assert_eq!(*seen.borrow(), (0..7).collect::<Vec<_>>());
        assert!(items[0].failed);
        assert!(!items[1].failed);
    }

    #[tokio::test]
    async fn empty_batch_only_sets_max() {
        let mut items = records(0);
        let mut bar = RecordingBar::default();
        let mut progress = Progress::none().bar(&mut bar);

        process_in_groups(&mut items, 5, &mut progress, &YieldNow, |_, _| async {}).await;

        assert_eq!(bar.max, Some(0));
        assert!(bar.values.is_empty());
    }

    #[test]
    fn percent_text_rounds() {
        assert_eq!(percent_text(1, 3), "33%");
        assert_eq!(percent_text(2, 3), "67%");
        assert_eq!(percent_text(10, 10), "100%");
    }

    #[test]
    fn percent_text_of_empty_batch_is_complete() {
        assert_eq!(percent_text(0, 0), "100%");
    }
}
