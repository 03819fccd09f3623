//! 道路标注锚点
//!
//! 用二分法在路径上放置重复的标注实例：取区间中点放一个实例，
//! 左右两侧各让出半个标注宽度加上重复间隔，剩余部分还能放下整个标注时继续细分。
//! 这样任意两个相邻锚点的距离不小于 `label_width + repeat_distance`。

/// 计算锚点在路径上的弧长位置，升序返回
///
/// 实例超过 `max_instances` 时保留离路径中点最近的那些。
pub fn compute_anchors(length: f64, label_width: f64, repeat_distance: f64, max_instances: usize) -> Vec<f64> {
    if label_width.is_nan() || label_width <= 0.0 || !length.is_finite() || label_width > length || max_instances == 0 {
        return Vec::new();
    }
    let repeat = repeat_distance.max(0.0);
    let half = label_width / 2.0;

    let mut anchors = Vec::new();
    let mut spans = vec![(0.0, length)];
    while let Some((start, end)) = spans.pop() {
        let mid = (start + end) / 2.0;
        anchors.push(mid);

        let left = (start, mid - half - repeat);
        if left.1 - left.0 >= label_width {
            spans.push(left);
        }
        let right = (mid + half + repeat, end);
        if right.1 - right.0 >= label_width {
            spans.push(right);
        }
    }

    if anchors.len() > max_instances {
        let center = length / 2.0;
        anchors.sort_by(|a, b| (a - center).abs().total_cmp(&(b - center).abs()));
        anchors.truncate(max_instances);
    }
    anchors.sort_by(f64::total_cmp);
    anchors
}

/// 每个锚点的实例序号：离路径中点越近序号越小，距离相同时左侧在前
///
/// 锚点数量随缩放变化时，中点处的实例始终是 0 号，标识键因此保持不变。
pub fn center_out_ranks(anchors: &[f64], length: f64) -> Vec<u32> {
    let center = length / 2.0;
    let mut order: Vec<usize> = (0..anchors.len()).collect();
    order.sort_by(|&a, &b| {
        (anchors[a] - center)
            .abs()
            .total_cmp(&(anchors[b] - center).abs())
            .then(anchors[a].total_cmp(&anchors[b]))
    });
    let mut ranks = vec![0; anchors.len()];
    for (rank, i) in order.into_iter().enumerate() {
        ranks[i] = rank as u32;
    }
    ranks
}
