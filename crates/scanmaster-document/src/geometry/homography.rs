// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar homography from four point correspondences.

use super::{Point2D, Quadrilateral};

/// Pivot magnitude below which the correspondence system counts as singular.
const SINGULAR_PIVOT: f64 = 1e-10;

/// A 3x3 projective transform stored row-major, normalised so `m[8] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [f64; 9],
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Solve for the transform taking each `src[i]` to `dst[i]`.
    ///
    /// Returns `None` when the points are degenerate (three collinear corners
    /// on either side make the 8x8 system singular).
    pub fn from_correspondences(src: [Point2D; 4], dst: [Point2D; 4]) -> Option<Self> {
        // Unknowns h0..h7 with h8 = 1:
        //   u = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)
        //   v = (h3 x + h4 y + h5) / (h6 x + h7 y + 1)
        let mut a = [[0.0f64; 9]; 8];
        for i in 0..4 {
            let Point2D { x, y } = src[i];
            let Point2D { x: u, y: v } = dst[i];
            a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
            a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
        }

        let h = solve_8x8(a)?;
        Some(Self {
            m: [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0],
        })
    }

    /// Transform mapping `quad` onto the rectangle `(0,0)-(w,0)-(w,h)-(0,h)`.
    pub fn quad_to_rect(quad: &Quadrilateral, width: f64, height: f64) -> Option<Self> {
        Self::from_correspondences(quad.corners(), Quadrilateral::rectangle(width, height).corners())
    }

    /// Map a point. `None` if it lands on the line at infinity.
    pub fn apply(&self, p: Point2D) -> Option<Point2D> {
        let m = &self.m;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if w.abs() < SINGULAR_PIVOT {
            return None;
        }
        Some(Point2D::new(
            (m[0] * p.x + m[1] * p.y + m[2]) / w,
            (m[3] * p.x + m[4] * p.y + m[5]) / w,
        ))
    }

    /// Inverse transform via the adjugate.
    pub fn inverse(&self) -> Option<Self> {
        let m = &self.m;
        let det = m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6]);
        if det.abs() < SINGULAR_PIVOT {
            return None;
        }
        let adj = [
            m[4] * m[8] - m[5] * m[7],
            m[2] * m[7] - m[1] * m[8],
            m[1] * m[5] - m[2] * m[4],
            m[5] * m[6] - m[3] * m[8],
            m[0] * m[8] - m[2] * m[6],
            m[2] * m[3] - m[0] * m[5],
            m[3] * m[7] - m[4] * m[6],
            m[1] * m[6] - m[0] * m[7],
            m[0] * m[4] - m[1] * m[3],
        ];
        let scale = adj[8] / det;
        if scale.abs() < SINGULAR_PIVOT {
            return None;
        }
        let mut inv = [0.0; 9];
        for (dst, v) in inv.iter_mut().zip(adj) {
            *dst = v / det / scale;
        }
        Some(Self { m: inv })
    }

    /// Row-major coefficients.
    pub fn matrix(&self) -> [f64; 9] {
        self.m
    }

    /// Row-major coefficients narrowed for `imageproc`.
    pub fn to_f32(&self) -> [f32; 9] {
        self.m.map(|v| v as f32)
    }
}

/// Gaussian elimination with partial pivoting on an augmented 8x9 system.
fn solve_8x8(mut a: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < SINGULAR_PIVOT {
            return None;
        }
        a.swap(col, pivot);

        for row in (col + 1)..8 {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut x = [0.0f64; 8];
    for row in (0..8).rev() {
        let mut acc = a[row][8];
        for k in (row + 1)..8 {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Some(x)
}
