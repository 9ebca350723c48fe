//! Scanline-free triangle and line rasterization for the software backend.
//!
//! Triangles are clipped in homogeneous space against the reverse-Z volume
//! (`0 <= z <= w`), then filled with edge functions over their screen
//! bounding box. Attributes are interpolated perspective-correctly; depth is
//! interpolated linearly in screen space, as the hardware does.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Smallest clip-space w kept by clipping.
const W_EPSILON: f32 = 1e-5;

/// A vertex after the vertex stage.
#[derive(Clone, Copy, Debug)]
pub(super) struct ClipVertex<const N: usize> {
    pub clip: Vec4,
    pub attrs: [f32; N],
}

impl<const N: usize> ClipVertex<N> {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            clip: self.clip.lerp(other.clip, t),
            attrs: std::array::from_fn(|i| self.attrs[i] + (other.attrs[i] - self.attrs[i]) * t),
        }
    }
}

/// A covered pixel.
#[derive(Clone, Copy, Debug)]
pub(super) struct Fragment<const N: usize> {
    pub x: u32,
    pub y: u32,
    /// Reverse-Z NDC depth: 1 at the near plane, 0 at the far plane.
    pub depth: f32,
    pub attrs: [f32; N],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// NDC to pixel coordinates, y down.
    pub fn to_screen(&self, ndc: Vec2) -> Vec2 {
        Vec2::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (0.5 - ndc.y * 0.5) * self.height as f32,
        )
    }

    /// Pixel center to NDC.
    pub fn to_ndc(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / self.height as f32 * 2.0,
        )
    }

    /// Pixel center to `[0, 1]²` texture space.
    pub fn to_uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

pub(super) fn to_clip(m: &Mat4, p: Vec3) -> Vec4 {
    *m * p.extend(1.0)
}

/// Signed distance to clip plane `plane`; inside is non-negative.
fn plane_distance(plane: usize, c: Vec4) -> f32 {
    match plane {
        0 => c.w - W_EPSILON,
        1 => c.w - c.z,
        _ => c.z,
    }
}

fn clip_triangle<const N: usize>(tri: [ClipVertex<N>; 3]) -> Vec<ClipVertex<N>> {
    let mut poly = tri.to_vec();
    for plane in 0..3 {
        if poly.is_empty() {
            break;
        }
        let mut out = Vec::with_capacity(poly.len() + 2);
        for i in 0..poly.len() {
            let a = &poly[i];
            let b = &poly[(i + 1) % poly.len()];
            let da = plane_distance(plane, a.clip);
            let db = plane_distance(plane, b.clip);
            if da >= 0.0 {
                out.push(*a);
            }
            if (da >= 0.0) != (db >= 0.0) {
                out.push(a.lerp(b, da / (da - db)));
            }
        }
        poly = out;
    }
    poly
}

struct ScreenVertex<const N: usize> {
    pos: Vec2,
    depth: f32,
    inv_w: f32,
    /// Attributes divided by w.
    attrs: [f32; N],
}

impl<const N: usize> ScreenVertex<N> {
    fn new(viewport: &Viewport, v: &ClipVertex<N>) -> Self {
        let inv_w = 1.0 / v.clip.w;
        let ndc = v.clip.truncate() * inv_w;
        Self {
            pos: viewport.to_screen(ndc.truncate()),
            depth: ndc.z,
            inv_w,
            attrs: v.attrs.map(|a| a * inv_w),
        }
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Clip and fill a triangle. Both windings are drawn.
pub(super) fn draw_triangle<const N: usize>(
    viewport: &Viewport,
    tri: [ClipVertex<N>; 3],
    fragment: &mut impl FnMut(&Fragment<N>),
) {
    let poly = clip_triangle(tri);
    if poly.len() < 3 {
        return;
    }
    let screen: Vec<ScreenVertex<N>> = poly.iter().map(|v| ScreenVertex::new(viewport, v)).collect();
    for i in 1..screen.len() - 1 {
        fill(viewport, [&screen[0], &screen[i], &screen[i + 1]], fragment);
    }
}

fn fill<const N: usize>(
    viewport: &Viewport,
    [a, b, c]: [&ScreenVertex<N>; 3],
    fragment: &mut impl FnMut(&Fragment<N>),
) {
    let area = edge(a.pos, b.pos, c.pos);
    if area.abs() < f32::EPSILON {
        return;
    }
    let min = a.pos.min(b.pos).min(c.pos).floor().max(Vec2::ZERO);
    let max = a
        .pos
        .max(b.pos)
        .max(c.pos)
        .ceil()
        .min(Vec2::new(viewport.width as f32, viewport.height as f32));
    if min.x >= max.x || min.y >= max.y {
        return;
    }
    let inv_area = 1.0 / area;
    for y in min.y as u32..max.y as u32 {
        for x in min.x as u32..max.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(b.pos, c.pos, p) * inv_area;
            let w1 = edge(c.pos, a.pos, p) * inv_area;
            let w2 = edge(a.pos, b.pos, p) * inv_area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let inv_w = w0 * a.inv_w + w1 * b.inv_w + w2 * c.inv_w;
            if inv_w <= 0.0 {
                continue;
            }
            let attrs = std::array::from_fn(|i| {
                (w0 * a.attrs[i] + w1 * b.attrs[i] + w2 * c.attrs[i]) / inv_w
            });
            fragment(&Fragment {
                x,
                y,
                depth: w0 * a.depth + w1 * b.depth + w2 * c.depth,
                attrs,
            });
        }
    }
}

/// Draw an indexed triangle list. Triangles with an out-of-range index are
/// skipped.
pub(super) fn draw_indexed<const N: usize>(
    viewport: &Viewport,
    indices: &[u32],
    vertex: impl Fn(usize) -> Option<ClipVertex<N>>,
    mut fragment: impl FnMut(&Fragment<N>),
) {
    for tri in indices.chunks_exact(3) {
        let (Some(a), Some(b), Some(c)) = (
            vertex(tri[0] as usize),
            vertex(tri[1] as usize),
            vertex(tri[2] as usize),
        ) else {
            continue;
        };
        draw_triangle(viewport, [a, b, c], &mut fragment);
    }
}

/// Draw a line between two clip-space points, clipped against the near
/// plane. `plot` gets every covered pixel.
pub(super) fn draw_line(viewport: &Viewport, a: Vec4, b: Vec4, mut plot: impl FnMut(u32, u32)) {
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    for plane in 0..2 {
        let da = plane_distance(plane, a);
        let db = plane_distance(plane, b);
        if da < 0.0 && db < 0.0 {
            return;
        }
        if da < 0.0 {
            t0 = t0.max(da / (da - db));
        } else if db < 0.0 {
            t1 = t1.min(da / (da - db));
        }
    }
    if t0 > t1 {
        return;
    }
    let (ca, cb) = (a.lerp(b, t0), a.lerp(b, t1));
    let pa = viewport.to_screen(ca.truncate().truncate() / ca.w);
    let pb = viewport.to_screen(cb.truncate().truncate() / cb.w);

    let steps = (pb - pa).abs().max_element().ceil().max(1.0);
    // Off-screen lines can be arbitrarily long after projection.
    if !steps.is_finite() || steps > 16_384.0 {
        return;
    }
    let step = (pb - pa) / steps;
    let mut p = pa;
    for _ in 0..=steps as u32 {
        if p.x >= 0.0 && p.y >= 0.0 && p.x < viewport.width as f32 && p.y < viewport.height as f32 {
            plot(p.x as u32, p.y as u32);
        }
        p += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32, w: f32, attr: f32) -> ClipVertex<1> {
        ClipVertex {
            clip: Vec4::new(x * w, y * w, z * w, w),
            attrs: [attr],
        }
    }

    fn collect(viewport: &Viewport, tri: [ClipVertex<1>; 3]) -> Vec<Fragment<1>> {
        let mut out = Vec::new();
        draw_triangle(viewport, tri, &mut |f: &Fragment<1>| out.push(*f));
        out
    }

    #[test]
    fn test_fullscreen_triangle_covers_every_pixel() {
        let viewport = Viewport::new(8, 6);
        let tri = [
            vertex(-1.0, -1.0, 0.5, 1.0, 0.0),
            vertex(3.0, -1.0, 0.5, 1.0, 0.0),
            vertex(-1.0, 3.0, 0.5, 1.0, 0.0),
        ];
        let frags = collect(&viewport, tri);
        assert_eq!(frags.len(), 48);
        assert!(frags.iter().all(|f| (f.depth - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_both_windings_are_drawn() {
        let viewport = Viewport::new(8, 8);
        let a = vertex(-1.0, -1.0, 0.5, 1.0, 0.0);
        let b = vertex(1.0, -1.0, 0.5, 1.0, 0.0);
        let c = vertex(0.0, 1.0, 0.5, 1.0, 0.0);
        let ccw = collect(&viewport, [a, b, c]);
        let cw = collect(&viewport, [a, c, b]);
        assert!(!ccw.is_empty());
        assert_eq!(ccw.len(), cw.len());
    }

    #[test]
    fn test_triangle_behind_camera_is_discarded() {
        let viewport = Viewport::new(8, 8);
        let behind = |x: f32, y: f32| ClipVertex {
            clip: Vec4::new(x, y, 0.5, -1.0),
            attrs: [0.0],
        };
        assert!(collect(&viewport, [behind(-1.0, -1.0), behind(1.0, -1.0), behind(0.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_triangle_past_far_plane_is_discarded() {
        let viewport = Viewport::new(8, 8);
        let tri = [
            vertex(-1.0, -1.0, -0.5, 1.0, 0.0),
            vertex(1.0, -1.0, -0.5, 1.0, 0.0),
            vertex(0.0, 1.0, -0.5, 1.0, 0.0),
        ];
        assert!(collect(&viewport, tri).is_empty());
    }

    #[test]
    fn test_near_crossing_triangle_is_clipped_not_dropped() {
        let viewport = Viewport::new(16, 16);
        // One vertex in front of the near plane (z > w).
        let tri = [
            ClipVertex { clip: Vec4::new(-0.5, -0.5, 2.0, 1.0), attrs: [0.0] },
            vertex(0.5, -0.5, 0.5, 1.0, 0.0),
            vertex(0.0, 0.5, 0.5, 1.0, 0.0),
        ];
        let frags = collect(&viewport, tri);
        assert!(!frags.is_empty());
        assert!(frags.iter().all(|f| f.depth <= 1.0 + 1e-5 && f.depth >= 0.0));
    }

    #[test]
    fn test_attributes_are_perspective_correct() {
        let viewport = Viewport::new(32, 1);
        // A segment receding from w=1 to w=4, attribute 0 to 1.
        let tri = [
            vertex(-1.0, -3.0, 0.5, 1.0, 0.0),
            vertex(1.0, -3.0, 0.5, 4.0, 1.0),
            vertex(0.0, 3.0, 0.5, 1.0, 0.0),
        ];
        let mut row: Vec<(u32, f32)> = collect(&viewport, tri)
            .iter()
            .map(|f| (f.x, f.attrs[0]))
            .collect();
        row.sort_by_key(|(x, _)| *x);
        // Screen midpoint is much closer to the near end in attribute space.
        let (_, mid) = row[row.len() / 2];
        assert!(mid < 0.5, "attribute at screen midpoint was {mid}");
    }

    #[test]
    fn test_indexed_skips_bad_indices() {
        let viewport = Viewport::new(4, 4);
        let verts = [
            vertex(-1.0, -1.0, 0.5, 1.0, 0.0),
            vertex(3.0, -1.0, 0.5, 1.0, 0.0),
            vertex(-1.0, 3.0, 0.5, 1.0, 0.0),
        ];
        let mut count = 0;
        draw_indexed(
            &viewport,
            &[0, 1, 2, 0, 1, 9],
            |i| verts.get(i).copied(),
            |_| count += 1,
        );
        assert_eq!(count, 16);
    }

    #[test]
    fn test_horizontal_line_covers_row() {
        let viewport = Viewport::new(10, 10);
        let mut pixels = Vec::new();
        draw_line(
            &viewport,
            Vec4::new(-0.95, 0.05, 0.5, 1.0),
            Vec4::new(0.95, 0.05, 0.5, 1.0),
            |x, y| pixels.push((x, y)),
        );
        assert!(pixels.iter().all(|&(_, y)| y == 4));
        let xs: std::collections::BTreeSet<u32> = pixels.iter().map(|&(x, _)| x).collect();
        assert_eq!(xs.len(), 10);
    }

    #[test]
    fn test_line_behind_camera_draws_nothing() {
        let viewport = Viewport::new(10, 10);
        let mut count = 0;
        draw_line(
            &viewport,
            Vec4::new(0.0, 0.0, 0.5, -1.0),
            Vec4::new(0.5, 0.0, 0.5, -2.0),
            |_, _| count += 1,
        );
        assert_eq!(count, 0);
    }
}
