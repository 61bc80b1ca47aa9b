#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
#[allow(non_snake_case)]
pub struct Vertex {
    pub a_Pos: [f32; 3],
}

impl Vertex {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vertex { a_Pos: [x, y, z] }
    }
}

/// Fixed geometry uploaded once at startup.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
}

impl Mesh {
    /// Number of elements passed to the draw call.
    pub fn draw_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len() as u32,
            None => self.vertices.len() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Triangle,
    Sierpinski,
}

impl Shape {
    pub fn mesh(self) -> Mesh {
        match self {
            Shape::Triangle => triangle(),
            Shape::Sierpinski => sierpinski(),
        }
    }
}

fn sqrt3() -> f32 {
    3f32.sqrt()
}

pub fn triangle() -> Mesh {
    let s = sqrt3();
    Mesh {
        vertices: vec![
            Vertex::new(-0.5, -0.5 * s / 2.0, 0.0),
            Vertex::new(0.5, -0.5 * s / 2.0, 0.0),
            Vertex::new(0.0, 0.5 * s / 2.0, 0.0),
        ],
        indices: None,
    }
}

/// One subdivision step: three corner triangles around an empty middle.
pub fn sierpinski() -> Mesh {
    let s = sqrt3();
    Mesh {
        vertices: vec![
            // outer corners
            Vertex::new(-0.5, -0.5 * s / 3.0, 0.0),
            Vertex::new(0.5, -0.5 * s / 3.0, 0.0),
            Vertex::new(0.0, 0.5 * s * 2.0 / 3.0, 0.0),
            // edge midpoints
            Vertex::new(-0.5 / 2.0, 0.5 * s / 6.0, 0.0),
            Vertex::new(0.5 / 2.0, 0.5 * s / 6.0, 0.0),
            Vertex::new(0.0, -0.5 * s / 3.0, 0.0),
        ],
        indices: Some(vec![0, 3, 5, 3, 2, 4, 5, 4, 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const EPS: f32 = 1e-6;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    fn area(a: &Vertex, b: &Vertex, c: &Vertex) -> f32 {
        let [ax, ay, _] = a.a_Pos;
        let [bx, by, _] = b.a_Pos;
        let [cx, cy, _] = c.a_Pos;
        ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs() / 2.0
    }

    #[test]
    fn triangle_matches_equilateral_formula() {
        let mesh = triangle();
        assert_eq!(mesh.vertices.len(), 3);
        assert!(mesh.indices.is_none());
        assert_eq!(mesh.draw_count(), 3);

        let half_height = 0.5 * 3f32.sqrt() / 2.0;
        assert_eq!(mesh.vertices[0].a_Pos[0], -0.5);
        assert_eq!(mesh.vertices[1].a_Pos[0], 0.5);
        assert!(approx(mesh.vertices[0].a_Pos[1], -half_height));
        assert!(approx(mesh.vertices[1].a_Pos[1], -half_height));
        assert!(approx(mesh.vertices[2].a_Pos[1], 0.4330127));
        assert!(mesh.vertices.iter().all(|v| v.a_Pos[2] == 0.0));
    }

    #[test]
    fn triangle_is_equilateral() {
        let v = triangle().vertices;
        let side = |a: &Vertex, b: &Vertex| {
            let dx = a.a_Pos[0] - b.a_Pos[0];
            let dy = a.a_Pos[1] - b.a_Pos[1];
            (dx * dx + dy * dy).sqrt()
        };
        assert!(approx(side(&v[0], &v[1]), 1.0));
        assert!(approx(side(&v[1], &v[2]), 1.0));
        assert!(approx(side(&v[2], &v[0]), 1.0));
    }

    #[test]
    fn sierpinski_top_vertex() {
        let mesh = sierpinski();
        assert!(approx(mesh.vertices[2].a_Pos[1], 0.5 * 3f32.sqrt() * 2.0 / 3.0));
        assert!(approx(mesh.vertices[0].a_Pos[1], -0.5 * 3f32.sqrt() / 3.0));
        assert!(approx(mesh.vertices[3].a_Pos[1], 0.5 * 3f32.sqrt() / 6.0));
    }

    #[test]
    fn sierpinski_indices_are_in_range() {
        let mesh = sierpinski();
        let indices = mesh.indices.as_ref().unwrap();
        assert_eq!(indices.len() % 3, 0);
        assert_eq!(mesh.draw_count(), 9);
        assert!(indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn sierpinski_midpoints_lie_on_outer_edges() {
        let v = sierpinski().vertices;
        let mid = |a: &Vertex, b: &Vertex| {
            [
                (a.a_Pos[0] + b.a_Pos[0]) / 2.0,
                (a.a_Pos[1] + b.a_Pos[1]) / 2.0,
            ]
        };
        for (m, (a, b)) in [(3, (0, 2)), (4, (1, 2)), (5, (0, 1))].iter() {
            let expected = mid(&v[*a], &v[*b]);
            assert!(approx(v[*m].a_Pos[0], expected[0]), "midpoint {}", m);
            assert!(approx(v[*m].a_Pos[1], expected[1]), "midpoint {}", m);
        }
    }

    #[test]
    fn sierpinski_makes_three_disjoint_corner_triangles() {
        let mesh = sierpinski();
        let v = &mesh.vertices;
        let indices = mesh.indices.as_ref().unwrap();
        let tris: Vec<&[u32]> = indices.chunks(3).collect();
        assert_eq!(tris.len(), 3);

        let outer = area(&v[0], &v[1], &v[2]);
        for tri in &tris {
            let a = area(
                &v[tri[0] as usize],
                &v[tri[1] as usize],
                &v[tri[2] as usize],
            );
            assert!(approx(a, outer / 4.0));
        }

        // corner triangles touch at a single midpoint, never along an edge
        for i in 0..tris.len() {
            for j in i + 1..tris.len() {
                let a: HashSet<_> = tris[i].iter().collect();
                let b: HashSet<_> = tris[j].iter().collect();
                assert_eq!(a.intersection(&b).count(), 1);
            }
        }

        // the three corners plus the middle hole tile the outer triangle
        let hole = area(&v[3], &v[4], &v[5]);
        let covered: f32 = tris
            .iter()
            .map(|t| area(&v[t[0] as usize], &v[t[1] as usize], &v[t[2] as usize]))
            .sum();
        assert!(approx(covered + hole, outer));
    }

    #[test]
    fn shape_selects_geometry() {
        assert_eq!(Shape::Triangle.mesh().vertices, triangle().vertices);
        assert_eq!(Shape::Sierpinski.mesh().indices, sierpinski().indices);
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 12);
    }
}
