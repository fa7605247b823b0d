//! 2x3 affine matrices for mapping inference-space points.

/// Row-major 2x3 affine matrix `[a, b, tx, c, d, ty]`.
///
/// A point maps as `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineMatrix {
    pub m: [f32; 6],
}

impl AffineMatrix {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    /// Uniform scale followed by a translation.
    pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Self {
        Self {
            m: [scale, 0.0, tx, 0.0, scale, ty],
        }
    }

    /// Maps one point through the matrix.
    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.m;
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}
