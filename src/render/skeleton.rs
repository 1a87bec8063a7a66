use super::options::VisualizationOptions;
use super::surface::Canvas;
use crate::pose::{KeypointRecord, Pose, SKELETON_CONNECTIONS};

/// 描画対象のキーポイントか（可視性と部位の表示設定）
fn is_drawable(pose: &Pose, index: usize, options: &VisualizationOptions, min_visibility: f32) -> bool {
    pose.keypoints[index].is_valid(min_visibility) && options.is_joint_shown(index)
}

/// 1人分の姿勢を描画
///
/// 骨格線を先に、キーポイントの円を後に描くので円が線の上に乗る。
pub fn draw_pose<C: Canvas>(canvas: &mut C, pose: &Pose, options: &VisualizationOptions, min_visibility: f32) {
    let w = canvas.width();
    let h = canvas.height();

    // 骨格線を描画
    for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
        let (a, b) = (*start_idx as usize, *end_idx as usize);
        if !is_drawable(pose, a, options, min_visibility) || !is_drawable(pose, b, options, min_visibility) {
            continue;
        }
        let (x1, y1) = pose.get(*start_idx).to_pixel(w, h);
        let (x2, y2) = pose.get(*end_idx).to_pixel(w, h);
        canvas.draw_line(
            x1 as f32,
            y1 as f32,
            x2 as f32,
            y2 as f32,
            options.connector_width,
            options.connector_color,
        );
    }

    // キーポイントを描画
    for (index, kp) in pose.keypoints.iter().enumerate() {
        if !is_drawable(pose, index, options, min_visibility) {
            continue;
        }
        let (px, py) = kp.to_pixel(w, h);
        canvas.fill_circle(px as f32, py as f32, options.joint_radius, options.joint_color);
    }
}

/// レコード内の全員を描画
pub fn draw_record<C: Canvas>(
    canvas: &mut C,
    record: &KeypointRecord,
    options: &VisualizationOptions,
    min_visibility: f32,
) {
    for pose in &record.landmarks {
        draw_pose(canvas, pose, options, min_visibility);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex, Region};
    use crate::render::{Color, Surface, Snapshot};

    #[derive(Debug, PartialEq)]
    enum Op {
        Line((i32, i32), (i32, i32)),
        Circle(i32, i32),
    }

    /// 描画呼び出しを記録するだけのキャンバス
    struct Recorder {
        ops: Vec<Op>,
    }

    impl Canvas for Recorder {
        fn width(&self) -> u32 {
            100
        }
        fn height(&self) -> u32 {
            100
        }
        fn clear_rect(&mut self, _x: u32, _y: u32, _w: u32, _h: u32) {}
        fn fill_circle(&mut self, cx: f32, cy: f32, _radius: f32, _color: Color) {
            self.ops.push(Op::Circle(cx as i32, cy as i32));
        }
        fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, _width: f32, _color: Color) {
            self.ops.push(Op::Line((x0 as i32, y0 as i32), (x1 as i32, y1 as i32)));
        }
        fn snapshot(&self) -> Snapshot {
            Surface::new(0, 0).snapshot()
        }
        fn restore(&mut self, _snapshot: &Snapshot) -> bool {
            false
        }
    }

    /// インデックス i のキーポイントを 100x100 の (i, i) に置いた姿勢
    fn diagonal_pose(visibility: f32) -> Pose {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, kp) in keypoints.iter_mut().enumerate() {
            let v = (i as f32 + 0.5) / 100.0;
            *kp = Keypoint::new(v, v, visibility);
        }
        Pose::new(keypoints)
    }

    fn circles(ops: &[Op]) -> Vec<usize> {
        ops.iter()
            .filter_map(|op| match op {
                Op::Circle(x, _) => Some(*x as usize),
                _ => None,
            })
            .collect()
    }

    fn line_endpoints(ops: &[Op]) -> Vec<(usize, usize)> {
        ops.iter()
            .filter_map(|op| match op {
                Op::Line(a, b) => Some((a.0 as usize, b.0 as usize)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_lines_drawn_before_joints() {
        let mut canvas = Recorder { ops: Vec::new() };
        draw_pose(&mut canvas, &diagonal_pose(1.0), &VisualizationOptions::default(), 0.5);

        assert_eq!(line_endpoints(&canvas.ops).len(), SKELETON_CONNECTIONS.len());
        assert_eq!(circles(&canvas.ops).len(), KeypointIndex::COUNT);
        let first_circle = canvas.ops.iter().position(|op| matches!(op, Op::Circle(..))).unwrap();
        let last_line = canvas.ops.iter().rposition(|op| matches!(op, Op::Line(..))).unwrap();
        assert!(last_line < first_circle);
    }

    #[test]
    fn test_low_visibility_skipped() {
        let mut pose = diagonal_pose(1.0);
        pose.keypoints[KeypointIndex::LeftElbow as usize].visibility = 0.49;

        let mut canvas = Recorder { ops: Vec::new() };
        draw_pose(&mut canvas, &pose, &VisualizationOptions::default(), 0.5);

        let elbow = KeypointIndex::LeftElbow as usize;
        assert!(!circles(&canvas.ops).contains(&elbow));
        assert!(line_endpoints(&canvas.ops)
            .iter()
            .all(|(a, b)| *a != elbow && *b != elbow));
        // 肩-肘、肘-手首の2本が消える
        assert_eq!(line_endpoints(&canvas.ops).len(), SKELETON_CONNECTIONS.len() - 2);
    }

    #[test]
    fn test_visibility_threshold_inclusive() {
        let mut canvas = Recorder { ops: Vec::new() };
        draw_pose(&mut canvas, &diagonal_pose(0.5), &VisualizationOptions::default(), 0.5);
        assert_eq!(circles(&canvas.ops).len(), KeypointIndex::COUNT);
    }

    #[test]
    fn test_hidden_region_skips_joints_and_connectors() {
        for region in Region::ALL {
            let mut options = VisualizationOptions::default();
            options.set_region_visible(region, false);

            let mut canvas = Recorder { ops: Vec::new() };
            draw_pose(&mut canvas, &diagonal_pose(1.0), &options, 0.5);

            let hidden: Vec<usize> = (0..KeypointIndex::COUNT)
                .filter(|i| Region::of(*i) == region)
                .collect();
            assert!(!hidden.is_empty());
            for px in &hidden {
                assert!(!circles(&canvas.ops).contains(px), "{:?} joint drawn", region);
                assert!(
                    line_endpoints(&canvas.ops).iter().all(|(a, b)| a != px && b != px),
                    "{:?} connector drawn",
                    region
                );
            }
        }
    }

    #[test]
    fn test_draw_record_draws_every_pose() {
        let record = KeypointRecord {
            video_id: "v".into(),
            timestamp: 0.0,
            landmarks: vec![diagonal_pose(1.0), diagonal_pose(1.0)],
            world_landmarks: None,
            segmentation_mask: None,
        };
        let mut canvas = Recorder { ops: Vec::new() };
        draw_record(&mut canvas, &record, &VisualizationOptions::default(), 0.5);
        assert_eq!(circles(&canvas.ops).len(), 2 * KeypointIndex::COUNT);
    }

    #[test]
    fn test_draws_pixels_on_surface() {
        let mut surface = Surface::new(100, 100);
        let options = VisualizationOptions::default();
        draw_pose(&mut surface, &diagonal_pose(1.0), &options, 0.5);
        assert_eq!(surface.pixel(0, 0), Some(options.joint_color));
    }
}
