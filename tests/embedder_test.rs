use deepsort_rt::{
    Appearance, DeepSort, Embedder, RawDetection, TrackLike, TrackerConfig, TrackerError,
};
use ndarray::{Array1, Array3, ArrayView3, Axis, s};

/// Mean color of the crop, one value per channel.
struct MeanColor {
    calls: usize,
}

impl Embedder for MeanColor {
    type Error = std::convert::Infallible;

    fn embed(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error> {
        self.calls += 1;
        Ok(crops
            .iter()
            .map(|crop| {
                let (h, w, c) = crop.dim();
                if h == 0 || w == 0 {
                    return Array1::zeros(c);
                }
                crop.mapv(f32::from)
                    .sum_axis(Axis(0))
                    .sum_axis(Axis(0))
                    .mapv(|v| v / (h * w) as f32)
            })
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("device lost")]
struct DeviceLost;

struct Broken;

impl Embedder for Broken {
    type Error = DeviceLost;

    fn embed(&mut self, _crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error> {
        Err(DeviceLost)
    }
}

struct Truncating;

impl Embedder for Truncating {
    type Error = std::convert::Infallible;

    fn embed(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Self::Error> {
        Ok(crops.iter().skip(1).map(|_| Array1::ones(3)).collect())
    }
}

/// Frame with a red block and a blue block.
fn frame(offset: usize) -> Array3<u8> {
    let mut frame = Array3::<u8>::zeros((240, 320, 3));
    frame
        .slice_mut(s![20..120, 20 + offset..70 + offset, 0])
        .fill(255);
    frame
        .slice_mut(s![100..200, 200 - offset..250 - offset, 2])
        .fill(255);
    frame
}

#[test]
fn test_tracks_from_frame_crops() {
    let mut deep_sort =
        DeepSort::with_embedder(TrackerConfig::default(), MeanColor { calls: 0 }).unwrap();
    assert!(deep_sort.has_embedder());

    let mut first_ids = Vec::new();
    for step in 0..3 {
        let offset = 4 * step;
        let image = frame(offset);
        let detections = [
            RawDetection::new([(20 + offset) as f32, 20.0, 50.0, 100.0], 0.9, "person"),
            RawDetection::new([(200 - offset) as f32, 100.0, 50.0, 100.0], 0.8, "person"),
        ];
        let tracks = deep_sort
            .update_tracks(&detections, Appearance::Frame(image.view()))
            .unwrap();

        assert_eq!(tracks.len(), 2);
        let ids: Vec<_> = tracks.iter().map(|t| t.track_id()).collect();
        if step == 0 {
            first_ids = ids;
        } else {
            assert_eq!(ids, first_ids);
        }
    }

    let tracks = deep_sort.tracker().tracks();
    assert!(tracks.iter().all(|t| t.is_confirmed()));
    assert_eq!(deep_sort.embedder_mut().unwrap().calls, 3);
}

#[test]
fn test_empty_frame_rejected_when_crops_needed() {
    let mut deep_sort =
        DeepSort::with_embedder(TrackerConfig::default(), MeanColor { calls: 0 }).unwrap();
    let empty = Array3::<u8>::zeros((0, 0, 3));

    let err = deep_sort.update_tracks(
        &[RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.9, "person")],
        Appearance::Frame(empty.view()),
    );
    assert!(matches!(err, Err(TrackerError::EmptyFrame { .. })));

    // Nothing to crop, nothing to complain about.
    let tracks = deep_sort
        .update_tracks(&[], Appearance::Frame(empty.view()))
        .unwrap();
    assert!(tracks.is_empty());
}

#[test]
fn test_embedder_failures_leave_tracker_untouched() {
    let image = frame(0);
    let detections = [RawDetection::new([20.0, 20.0, 50.0, 100.0], 0.9, "person")];

    let mut broken = DeepSort::with_embedder(TrackerConfig::default(), Broken).unwrap();
    let err = broken.update_tracks(&detections, Appearance::Frame(image.view()));
    assert!(matches!(err, Err(TrackerError::Embedding(_))));
    assert_eq!(broken.tracker().frame_count(), 0);

    let mut truncating = DeepSort::with_embedder(TrackerConfig::default(), Truncating).unwrap();
    let err = truncating.update_tracks(&detections, Appearance::Frame(image.view()));
    assert!(matches!(
        err,
        Err(TrackerError::EmbedderCountMismatch { expected: 1, got: 0 })
    ));
    assert!(truncating.tracker().tracks().is_empty());
}
