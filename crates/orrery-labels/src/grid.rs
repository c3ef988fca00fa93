//! Uniform-grid overlap suppression.

use glam::{Mat4, Vec2, Vec3};

/// A label that wants to be shown at a world-space anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelCandidate {
    pub anchor: Vec3,
    /// Approximate on-screen extent in pixels.
    pub size: Vec2,
}

impl LabelCandidate {
    pub fn new(anchor: Vec3, size: Vec2) -> Self {
        Self { anchor, size }
    }
}

/// Outcome for one candidate, in input order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub visible: bool,
    /// Pixel position of the anchor (origin top-left), `None` if it is
    /// behind the camera or outside the viewport.
    pub screen: Option<Vec2>,
    /// Clip-space `w`, the view distance along the camera axis.
    pub depth: f32,
}

impl LabelPlacement {
    const HIDDEN: Self = Self {
        visible: false,
        screen: None,
        depth: f32::INFINITY,
    };
}

/// Project a world point to pixels. Returns the pixel position and clip `w`,
/// or `None` when the point is behind the camera or off screen.
pub fn project_to_screen(
    view_proj: Mat4,
    point: Vec3,
    viewport: (u32, u32),
) -> Option<(Vec2, f32)> {
    let clip = view_proj * point.extend(1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if !(-1.0..=1.0).contains(&ndc.x) || !(-1.0..=1.0).contains(&ndc.y) {
        return None;
    }
    let (w, h) = (viewport.0 as f32, viewport.1 as f32);
    Some((
        Vec2::new((ndc.x + 1.0) * 0.5 * w, (1.0 - ndc.y) * 0.5 * h),
        clip.w,
    ))
}

/// Occupancy grid reused across evaluations.
///
/// Labels are boxes centred horizontally on the anchor and sitting just
/// above it. A label is shown only if none of the cells its box touches were
/// already claimed by a nearer label, which is conservative: two boxes that
/// share a cell without overlapping still suppress each other.
#[derive(Debug)]
pub struct LabelCollisionGrid {
    cell_size: f32,
    cols: u32,
    rows: u32,
    occupied: Vec<bool>,
    order: Vec<(usize, f32)>,
    placements: Vec<LabelPlacement>,
    reallocations: u32,
}

impl LabelCollisionGrid {
    pub const DEFAULT_CELL_SIZE: f32 = 64.0;

    /// `cell_size` is in pixels and must be positive.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: if cell_size > 0.0 {
                cell_size
            } else {
                Self::DEFAULT_CELL_SIZE
            },
            cols: 0,
            rows: 0,
            occupied: Vec::new(),
            order: Vec::new(),
            placements: Vec::new(),
            reallocations: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Grid dimensions in cells from the last evaluation.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// How many times the cell array has been reallocated.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }

    /// Placements from the last evaluation, in candidate order.
    pub fn placements(&self) -> &[LabelPlacement] {
        &self.placements
    }

    pub fn visible_count(&self) -> usize {
        self.placements.iter().filter(|p| p.visible).count()
    }

    fn prepare(&mut self, viewport: (u32, u32)) {
        let cols = (viewport.0 as f32 / self.cell_size).ceil().max(1.0) as u32;
        let rows = (viewport.1 as f32 / self.cell_size).ceil().max(1.0) as u32;
        if cols != self.cols || rows != self.rows {
            self.cols = cols;
            self.rows = rows;
            self.occupied = vec![false; (cols * rows) as usize];
            self.reallocations += 1;
            log::debug!("Label grid resized to {cols}x{rows} cells");
        } else {
            self.occupied.fill(false);
        }
    }

    fn cell_range(&self, min: f32, max: f32, count: u32) -> (u32, u32) {
        let last = count as i64 - 1;
        let lo = ((min / self.cell_size).floor() as i64).clamp(0, last);
        let hi = ((max / self.cell_size).floor() as i64).clamp(0, last);
        (lo as u32, hi as u32)
    }

    /// Decide which candidates are shown this frame.
    pub fn evaluate(
        &mut self,
        view_proj: Mat4,
        viewport: (u32, u32),
        candidates: &[LabelCandidate],
    ) -> &[LabelPlacement] {
        self.prepare(viewport);
        self.placements.clear();
        self.order.clear();

        for (i, c) in candidates.iter().enumerate() {
            match project_to_screen(view_proj, c.anchor, viewport) {
                Some((screen, depth)) => {
                    self.placements.push(LabelPlacement {
                        visible: false,
                        screen: Some(screen),
                        depth,
                    });
                    self.order.push((i, depth));
                }
                None => self.placements.push(LabelPlacement::HIDDEN),
            }
        }

        // Stable, so equal depths keep input order.
        self.order.sort_by(|a, b| a.1.total_cmp(&b.1));

        for k in 0..self.order.len() {
            let i = self.order[k].0;
            let Some(screen) = self.placements[i].screen else {
                continue;
            };
            let size = candidates[i].size;
            let half = size.x * 0.5;
            let (c0, c1) = self.cell_range(screen.x - half, screen.x + half, self.cols);
            let (r0, r1) = self.cell_range(screen.y - size.y, screen.y, self.rows);

            let cols = self.cols as usize;
            let blocked = (r0..=r1).any(|r| {
                let row = r as usize * cols;
                self.occupied[row + c0 as usize..=row + c1 as usize]
                    .iter()
                    .any(|&o| o)
            });
            if blocked {
                continue;
            }
            for r in r0..=r1 {
                let row = r as usize * cols;
                self.occupied[row + c0 as usize..=row + c1 as usize].fill(true);
            }
            self.placements[i].visible = true;
        }

        &self.placements
    }
}

impl Default for LabelCollisionGrid {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: (u32, u32) = (800, 600);
    const LABEL: Vec2 = Vec2::new(80.0, 20.0);

    fn camera() -> Mat4 {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 800.0 / 600.0, 10_000.0, 0.1);
        proj * view
    }

    fn label(x: f32, y: f32, z: f32) -> LabelCandidate {
        LabelCandidate::new(Vec3::new(x, y, z), LABEL)
    }

    #[test]
    fn test_centre_projects_to_viewport_centre() {
        let (p, depth) = project_to_screen(camera(), Vec3::ZERO, VIEWPORT).unwrap();
        assert!((p - Vec2::new(400.0, 300.0)).length() < 1e-3);
        assert!((depth - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_single_label_visible() {
        let mut grid = LabelCollisionGrid::default();
        let out = grid.evaluate(camera(), VIEWPORT, &[label(0.0, 0.0, 0.0)]);
        assert!(out[0].visible);
    }

    #[test]
    fn test_nearer_label_wins_regardless_of_order() {
        let far = label(0.0, 0.0, -50.0);
        let near = label(0.3, 0.0, 20.0);
        let mut grid = LabelCollisionGrid::default();

        let out = grid.evaluate(camera(), VIEWPORT, &[far, near]).to_vec();
        assert!(!out[0].visible);
        assert!(out[1].visible);

        let out = grid.evaluate(camera(), VIEWPORT, &[near, far]).to_vec();
        assert!(out[0].visible);
        assert!(!out[1].visible);
    }

    #[test]
    fn test_equal_depth_keeps_first() {
        let mut grid = LabelCollisionGrid::default();
        let out = grid.evaluate(camera(), VIEWPORT, &[label(0.0, 0.0, 0.0), label(0.2, 0.0, 0.0)]);
        assert!(out[0].visible);
        assert!(!out[1].visible);
    }

    #[test]
    fn test_separated_labels_both_visible() {
        let mut grid = LabelCollisionGrid::default();
        let out = grid.evaluate(
            camera(),
            VIEWPORT,
            &[label(-25.0, 15.0, 0.0), label(25.0, -15.0, 0.0)],
        );
        assert!(out.iter().all(|p| p.visible));
    }

    #[test]
    fn test_behind_camera_and_offscreen_suppressed() {
        let mut grid = LabelCollisionGrid::default();
        let out = grid.evaluate(
            camera(),
            VIEWPORT,
            &[label(0.0, 0.0, 200.0), label(5000.0, 0.0, 0.0), label(0.0, 0.0, 0.0)],
        );
        assert_eq!(out[0].screen, None);
        assert!(!out[0].visible);
        assert_eq!(out[1].screen, None);
        assert!(out[2].visible);
    }

    #[test]
    fn test_suppressed_labels_do_not_claim_cells() {
        // a hides b, but b must not block c which only overlaps b.
        let a = LabelCandidate::new(Vec3::new(0.0, 0.0, 10.0), Vec2::new(40.0, 10.0));
        let b = LabelCandidate::new(Vec3::new(2.0, 0.0, 0.0), Vec2::new(400.0, 10.0));
        let c = LabelCandidate::new(Vec3::new(30.0, 0.0, -10.0), Vec2::new(40.0, 10.0));
        let mut grid = LabelCollisionGrid::new(16.0);
        let out = grid.evaluate(camera(), VIEWPORT, &[a, b, c]);
        assert!(out[0].visible);
        assert!(!out[1].visible);
        assert!(out[2].visible);
    }

    #[test]
    fn test_grid_reused_until_viewport_changes() {
        let mut grid = LabelCollisionGrid::new(50.0);
        let labels = [label(0.0, 0.0, 0.0)];
        for _ in 0..5 {
            grid.evaluate(camera(), VIEWPORT, &labels);
            assert!(grid.placements()[0].visible);
        }
        assert_eq!(grid.reallocations(), 1);
        assert_eq!(grid.dimensions(), (16, 12));

        grid.evaluate(camera(), (820, 600), &labels);
        assert_eq!(grid.reallocations(), 2);
        assert_eq!(grid.dimensions(), (17, 12));
        // Same cell counts, no reallocation.
        grid.evaluate(camera(), (830, 590), &labels);
        assert_eq!(grid.reallocations(), 2);
    }

    #[test]
    fn test_many_labels_at_one_point_show_one() {
        let labels: Vec<_> = (0..500).map(|i| label(0.0, 0.0, -(i as f32) * 0.1)).collect();
        let mut grid = LabelCollisionGrid::default();
        grid.evaluate(camera(), VIEWPORT, &labels);
        assert_eq!(grid.visible_count(), 1);
        assert!(grid.placements()[0].visible);
    }
}
