//! Non-maximum suppression over detection boxes.

use tracing::warn;

use crate::tracker::Rect;

/// Suppress boxes that overlap a higher scoring box by more than
/// `max_overlap`.
///
/// Overlap is the intersection area divided by the area of the candidate
/// being suppressed, with the integer-pixel `+1` convention. Without scores
/// boxes are ranked by their bottom edge. Returns the kept indices in input
/// order.
///
/// When `scores` and `boxes` differ in length only the common prefix is
/// considered; the remaining boxes are dropped.
pub fn non_max_suppression(
    boxes: &[Rect],
    max_overlap: f32,
    scores: Option<&[f32]>,
) -> Vec<usize> {
    let count = match scores {
        Some(scores) if scores.len() != boxes.len() => {
            warn!(
                boxes = boxes.len(),
                scores = scores.len(),
                "score count differs from box count, truncating"
            );
            scores.len().min(boxes.len())
        }
        _ => boxes.len(),
    };
    if count == 0 {
        return Vec::new();
    }

    let tlbr: Vec<[f32; 4]> = boxes[..count].iter().map(Rect::to_tlbr).collect();
    let area: Vec<f32> = tlbr
        .iter()
        .map(|b| (b[2] - b[0] + 1.0) * (b[3] - b[1] + 1.0))
        .collect();

    // Ascending rank, stable so equal scores keep input order.
    let mut idxs: Vec<usize> = (0..count).collect();
    match scores {
        Some(scores) => idxs.sort_by(|&a, &b| scores[a].total_cmp(&scores[b])),
        None => idxs.sort_by(|&a, &b| tlbr[a][3].total_cmp(&tlbr[b][3])),
    }

    let mut pick = Vec::new();
    while let Some(i) = idxs.pop() {
        pick.push(i);
        idxs.retain(|&j| {
            let w = (tlbr[i][2].min(tlbr[j][2]) - tlbr[i][0].max(tlbr[j][0]) + 1.0).max(0.0);
            let h = (tlbr[i][3].min(tlbr[j][3]) - tlbr[i][1].max(tlbr[j][1]) + 1.0).max(0.0);
            (w * h) / area[j] <= max_overlap
        });
    }

    pick.sort_unstable();
    pick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppresses_lower_score_overlap() {
        let boxes = [
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(5.0, 5.0, 100.0, 100.0),
            Rect::new(300.0, 300.0, 50.0, 50.0),
        ];
        let kept = non_max_suppression(&boxes, 0.5, Some(&[0.6, 0.9, 0.3]));
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_keeps_everything_below_threshold() {
        let boxes = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(8.0, 8.0, 10.0, 10.0),
        ];
        let kept = non_max_suppression(&boxes, 0.5, Some(&[0.5, 0.5]));
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn test_without_scores_ranks_by_bottom_edge() {
        let boxes = [
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(0.0, 2.0, 100.0, 100.0),
        ];
        let kept = non_max_suppression(&boxes, 0.3, None);
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn test_score_count_mismatch_uses_common_prefix() {
        let boxes = [
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(5.0, 5.0, 100.0, 100.0),
            Rect::new(300.0, 300.0, 50.0, 50.0),
        ];
        let kept = non_max_suppression(&boxes, 0.5, Some(&[0.6, 0.9]));
        assert_eq!(kept, vec![1]);

        let kept = non_max_suppression(&boxes[..1], 0.5, Some(&[0.6, 0.9, 0.3]));
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn test_empty() {
        assert!(non_max_suppression(&[], 0.5, None).is_empty());
    }
}
